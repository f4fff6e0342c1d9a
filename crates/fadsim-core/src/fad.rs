//! The drifting fish-aggregation device and its biomass reservoir.

use serde::{Deserialize, Serialize};

use crate::{Day, FisherId, FisheryError};

/// A deployed fish-aggregation device.
///
/// The reservoir holds the per-species biomass the device has drawn out of
/// the tiles it drifted over, never exceeding the per-species capacity it
/// was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct Fad {
    owner: FisherId,
    deployed_on: Day,
    attraction_rate: f64,
    capacity: Vec<f64>,
    reservoir: Vec<f64>,
}

impl Fad {
    #[must_use]
    pub fn new(owner: FisherId, deployed_on: Day, attraction_rate: f64, capacity: Vec<f64>) -> Self {
        let reservoir = vec![0.0; capacity.len()];
        Self {
            owner,
            deployed_on,
            attraction_rate,
            capacity,
            reservoir,
        }
    }

    #[must_use]
    pub const fn owner(&self) -> FisherId {
        self.owner
    }

    #[must_use]
    pub const fn deployed_on(&self) -> Day {
        self.deployed_on
    }

    #[must_use]
    pub const fn attraction_rate(&self) -> f64 {
        self.attraction_rate
    }

    #[must_use]
    pub fn capacity(&self) -> &[f64] {
        &self.capacity
    }

    #[must_use]
    pub fn reservoir(&self) -> &[f64] {
        &self.reservoir
    }

    #[must_use]
    pub fn total_reservoir(&self) -> f64 {
        self.reservoir.iter().sum()
    }

    /// Draw biomass out of the tile underneath the device.
    ///
    /// Per species, the device attracts `attraction_rate` of the tile's
    /// standing biomass, clipped to the room left in its reservoir; exactly
    /// that amount leaves the tile. A rate of zero skips the pass entirely.
    pub fn aggregate_fish(&mut self, tile_biomass: &mut [f64]) {
        if self.attraction_rate <= 0.0 {
            return;
        }
        debug_assert_eq!(tile_biomass.len(), self.reservoir.len());
        for (species, held) in self.reservoir.iter_mut().enumerate() {
            let room = self.capacity[species] - *held;
            let caught = (tile_biomass[species] * self.attraction_rate).min(room);
            *held += caught;
            tile_biomass[species] -= caught;
        }
    }

    /// Return the reservoir to the tile underneath, clamped at the tile's
    /// carrying capacity. The clamped-off excess is returned per species;
    /// it leaves the system.
    pub fn release_fish(&mut self, tile_biomass: &mut [f64], tile_capacity: &[f64]) -> Vec<f64> {
        debug_assert_eq!(tile_biomass.len(), self.reservoir.len());
        let mut discarded = Vec::with_capacity(self.reservoir.len());
        for (species, held) in self.reservoir.iter_mut().enumerate() {
            let landed = (tile_biomass[species] + *held).min(tile_capacity[species]);
            discarded.push(tile_biomass[species] + *held - landed);
            tile_biomass[species] = landed;
            *held = 0.0;
        }
        discarded
    }

    /// Empty the reservoir into a catch, as a successful set does.
    pub fn harvest_all(&mut self) -> Vec<f64> {
        let species = self.reservoir.len();
        std::mem::replace(&mut self.reservoir, vec![0.0; species])
    }
}

/// Blueprint for the devices a fishery hands its vessels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadTemplate {
    /// Per-species reservoir ceiling in kilograms.
    pub capacity_kg: Vec<f64>,
    /// Fraction of a tile's biomass attracted per day, in `[0, 1]`.
    pub attraction_rate: f64,
}

impl FadTemplate {
    pub fn validate(&self) -> Result<(), FisheryError> {
        if self.capacity_kg.is_empty() {
            return Err(FisheryError::InvalidConfig(
                "device template needs a capacity per species",
            ));
        }
        if self.capacity_kg.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return Err(FisheryError::InvalidConfig(
                "device capacities must be finite and positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.attraction_rate) {
            return Err(FisheryError::InvalidConfig(
                "attraction rate must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Build a fresh, empty device for `owner`.
    #[must_use]
    pub fn spawn(&self, owner: FisherId, deployed_on: Day) -> Fad {
        Fad::new(owner, deployed_on, self.attraction_rate, self.capacity_kg.clone())
    }
}
