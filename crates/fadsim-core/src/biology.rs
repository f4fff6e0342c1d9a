//! Species bookkeeping, tile biomass, vessel holds, and catch valuation.

use serde::{Deserialize, Serialize};

use crate::FisheryError;
use crate::geography::TilePos;

/// One modelled species. The index is its position in every per-species
/// slice used throughout the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Species {
    index: usize,
    code: String,
    name: String,
}

impl Species {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered registry of the species in play.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesTable {
    species: Vec<Species>,
}

impl SpeciesTable {
    /// Build a table from `(code, name)` pairs, indexed in input order.
    #[must_use]
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let species = entries
            .into_iter()
            .enumerate()
            .map(|(index, (code, name))| Species {
                index,
                code: code.to_owned(),
                name: name.to_owned(),
            })
            .collect();
        Self { species }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.species.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Species> {
        self.species.get(index)
    }

    pub fn by_code(&self, code: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }
}

/// Per-tile, per-species biomass raster with a fixed carrying capacity.
///
/// Cells are stored flat in row-major tile order, species-contiguous, so a
/// tile's biomass is always one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomassGrid {
    width: u32,
    height: u32,
    species_count: usize,
    biomass: Vec<f64>,
    capacity: Vec<f64>,
}

impl BiomassGrid {
    /// Construct a grid with every tile seeded at `initial` and capped at
    /// `capacity`, both per species.
    pub fn uniform(
        width: u32,
        height: u32,
        initial: &[f64],
        capacity: &[f64],
    ) -> Result<Self, FisheryError> {
        if width == 0 || height == 0 {
            return Err(FisheryError::InvalidConfig(
                "biomass grid dimensions must be non-zero",
            ));
        }
        if initial.is_empty() || initial.len() != capacity.len() {
            return Err(FisheryError::InvalidConfig(
                "biomass seeding needs one initial and one capacity figure per species",
            ));
        }
        if initial.iter().zip(capacity).any(|(b, c)| b > c) {
            return Err(FisheryError::InvalidConfig(
                "initial biomass must not exceed carrying capacity",
            ));
        }
        let tiles = (width as usize) * (height as usize);
        let mut biomass = Vec::with_capacity(tiles * initial.len());
        let mut cap = Vec::with_capacity(tiles * initial.len());
        for _ in 0..tiles {
            biomass.extend_from_slice(initial);
            cap.extend_from_slice(capacity);
        }
        Ok(Self {
            width,
            height,
            species_count: initial.len(),
            biomass,
            capacity: cap,
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn species_count(&self) -> usize {
        self.species_count
    }

    /// Returns the flat offset of a tile's species slice without bounds checks.
    #[inline]
    fn offset(&self, tile: TilePos) -> usize {
        ((tile.y as usize) * (self.width as usize) + (tile.x as usize)) * self.species_count
    }

    #[inline]
    fn in_bounds(&self, tile: TilePos) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    /// Per-species biomass of one tile.
    pub fn cell(&self, tile: TilePos) -> Option<&[f64]> {
        if self.in_bounds(tile) {
            let start = self.offset(tile);
            Some(&self.biomass[start..start + self.species_count])
        } else {
            None
        }
    }

    /// Mutable per-species biomass of one tile.
    pub fn cell_mut(&mut self, tile: TilePos) -> Option<&mut [f64]> {
        if self.in_bounds(tile) {
            let start = self.offset(tile);
            Some(&mut self.biomass[start..start + self.species_count])
        } else {
            None
        }
    }

    /// Per-species carrying capacity of one tile.
    pub fn capacity(&self, tile: TilePos) -> Option<&[f64]> {
        if self.in_bounds(tile) {
            let start = self.offset(tile);
            Some(&self.capacity[start..start + self.species_count])
        } else {
            None
        }
    }

    /// Mutable biomass together with the matching capacity slice, for
    /// release paths that clamp against the tile ceiling.
    pub fn cell_with_capacity_mut(&mut self, tile: TilePos) -> Option<(&mut [f64], &[f64])> {
        if self.in_bounds(tile) {
            let start = self.offset(tile);
            let end = start + self.species_count;
            Some((&mut self.biomass[start..end], &self.capacity[start..end]))
        } else {
            None
        }
    }

    /// Sum of biomass over every tile and species.
    #[must_use]
    pub fn total_biomass(&self) -> f64 {
        self.biomass.iter().sum()
    }
}

/// A vessel's fish hold. Catches past capacity are scaled down
/// proportionally across species so the hold never overflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    capacity_kg: f64,
    load: Vec<f64>,
}

impl Hold {
    pub fn new(capacity_kg: f64, species_count: usize) -> Result<Self, FisheryError> {
        if !capacity_kg.is_finite() || capacity_kg < 0.0 {
            return Err(FisheryError::InvalidConfig(
                "hold capacity must be finite and non-negative",
            ));
        }
        Ok(Self {
            capacity_kg,
            load: vec![0.0; species_count],
        })
    }

    #[must_use]
    pub const fn capacity_kg(&self) -> f64 {
        self.capacity_kg
    }

    #[must_use]
    pub fn load(&self) -> &[f64] {
        &self.load
    }

    #[must_use]
    pub fn total_load(&self) -> f64 {
        self.load.iter().sum()
    }

    /// Fraction of the hold in use, 1.0 when the hold has no capacity.
    #[must_use]
    pub fn fullness(&self) -> f64 {
        if self.capacity_kg <= 0.0 {
            return 1.0;
        }
        self.total_load() / self.capacity_kg
    }

    /// Store a catch, scaling it down proportionally if it would overflow
    /// the remaining room. Returns what was actually stored per species.
    pub fn store(&mut self, catch: &[f64]) -> Vec<f64> {
        debug_assert_eq!(catch.len(), self.load.len());
        let incoming: f64 = catch.iter().sum();
        if incoming <= 0.0 {
            return vec![0.0; self.load.len()];
        }
        let room = (self.capacity_kg - self.total_load()).max(0.0);
        let scale = if incoming <= room {
            1.0
        } else {
            room / incoming
        };
        let mut stored = Vec::with_capacity(catch.len());
        for (slot, caught) in self.load.iter_mut().zip(catch) {
            let kept = caught * scale;
            *slot += kept;
            stored.push(kept);
        }
        stored
    }

    /// Empty the hold, returning the per-species load that came off.
    pub fn unload(&mut self) -> Vec<f64> {
        let species = self.load.len();
        std::mem::replace(&mut self.load, vec![0.0; species])
    }
}

/// Values a per-species biomass bundle in currency.
pub trait CatchValuer: Send + Sync {
    fn value_of(&self, biomass: &[f64]) -> f64;
}

/// Flat per-kilogram prices, one per species index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPrices {
    per_kg: Vec<f64>,
}

impl FixedPrices {
    #[must_use]
    pub fn new(per_kg: Vec<f64>) -> Self {
        Self { per_kg }
    }
}

impl CatchValuer for FixedPrices {
    fn value_of(&self, biomass: &[f64]) -> f64 {
        biomass
            .iter()
            .zip(&self.per_kg)
            .map(|(kg, price)| kg * price)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn species_table_indexes_in_input_order() {
        let table = SpeciesTable::new([("BET", "Bigeye tuna"), ("SKJ", "Skipjack tuna")]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.by_code("SKJ").map(Species::index), Some(1));
        assert_eq!(table.get(0).map(Species::code), Some("BET"));
        assert!(table.by_code("YFT").is_none());
    }

    #[test]
    fn grid_seeds_every_tile_uniformly() {
        let grid = BiomassGrid::uniform(3, 2, &[100.0, 50.0], &[400.0, 200.0]).unwrap();
        assert_eq!(grid.cell(TilePos::new(2, 1)), Some(&[100.0, 50.0][..]));
        assert_eq!(grid.capacity(TilePos::new(0, 0)), Some(&[400.0, 200.0][..]));
        assert!((grid.total_biomass() - 6.0 * 150.0).abs() < 1e-9);
        assert!(grid.cell(TilePos::new(3, 0)).is_none());
    }

    #[test]
    fn grid_rejects_bad_seeding() {
        assert!(BiomassGrid::uniform(0, 2, &[1.0], &[2.0]).is_err());
        assert!(BiomassGrid::uniform(2, 2, &[], &[]).is_err());
        assert!(BiomassGrid::uniform(2, 2, &[1.0], &[2.0, 3.0]).is_err());
        assert!(BiomassGrid::uniform(2, 2, &[3.0], &[2.0]).is_err());
    }

    #[test]
    fn cell_with_capacity_views_the_same_tile() {
        let mut grid = BiomassGrid::uniform(2, 2, &[10.0], &[25.0]).unwrap();
        let (biomass, capacity) = grid.cell_with_capacity_mut(TilePos::new(1, 0)).unwrap();
        biomass[0] = capacity[0];
        assert_eq!(grid.cell(TilePos::new(1, 0)), Some(&[25.0][..]));
        assert_eq!(grid.cell(TilePos::new(0, 0)), Some(&[10.0][..]));
    }

    #[test]
    fn hold_scales_overflow_proportionally() {
        let mut hold = Hold::new(100.0, 2).unwrap();
        let stored = hold.store(&[60.0, 20.0]);
        assert_eq!(stored, vec![60.0, 20.0]);
        // 20kg of room left against 40kg incoming: everything halves.
        let stored = hold.store(&[30.0, 10.0]);
        assert_eq!(stored, vec![15.0, 5.0]);
        assert!((hold.total_load() - 100.0).abs() < 1e-9);
        assert!((hold.fullness() - 1.0).abs() < 1e-9);
        let stored = hold.store(&[5.0, 5.0]);
        assert_eq!(stored, vec![0.0, 0.0]);
    }

    #[test]
    fn hold_unload_returns_the_load_and_empties() {
        let mut hold = Hold::new(50.0, 2).unwrap();
        hold.store(&[10.0, 5.0]);
        assert_eq!(hold.unload(), vec![10.0, 5.0]);
        assert_eq!(hold.total_load(), 0.0);
        assert_eq!(hold.load(), &[0.0, 0.0]);
    }

    #[test]
    fn fixed_prices_value_per_species() {
        let valuer = FixedPrices::new(vec![2.0, 0.5]);
        assert!((valuer.value_of(&[10.0, 4.0]) - 22.0).abs() < 1e-9);
        assert_eq!(valuer.value_of(&[0.0, 0.0]), 0.0);
    }
}
