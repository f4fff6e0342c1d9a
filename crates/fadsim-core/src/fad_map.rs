//! Spatial registry of everything afloat: drift, loss, and aggregation.

use fadsim_drift::{Currents, DriftField, Point};
use slotmap::SlotMap;

use crate::biology::BiomassGrid;
use crate::fad::Fad;
use crate::geography::{NauticalMap, TilePos};
use crate::{Day, FadKey, FisherId, FisheryError};

/// A device that left play during the daily pass, with whatever biomass it
/// had aboard. That biomass leaves the system.
#[derive(Debug, Clone, PartialEq)]
pub struct FadLoss {
    pub key: FadKey,
    pub owner: FisherId,
    /// Tile of the last known in-domain position.
    pub tile: TilePos,
    pub biomass: Vec<f64>,
}

/// All deployed devices, their continuous positions, and the daily pass
/// that drifts them, strands them, and lets the survivors aggregate fish.
#[derive(Debug)]
pub struct FadMap {
    fads: SlotMap<FadKey, Fad>,
    field: DriftField<FadKey>,
}

impl FadMap {
    pub fn new(width: u32, height: u32, currents: Box<dyn Currents>) -> Result<Self, FisheryError> {
        Ok(Self {
            fads: SlotMap::with_key(),
            field: DriftField::new(width, height, currents)?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fads.is_empty()
    }

    /// Register a device at a continuous position.
    pub fn insert(&mut self, fad: Fad, at: Point) -> Result<FadKey, FisheryError> {
        let key = self.fads.insert(fad);
        if let Err(err) = self.field.insert(key, at) {
            self.fads.remove(key);
            return Err(err.into());
        }
        Ok(key)
    }

    /// Take a device out of the water, returning it with its last position.
    pub fn remove(&mut self, key: FadKey) -> Result<(Fad, Point), FisheryError> {
        let fad = self.fads.remove(key).ok_or(FisheryError::UnknownFad)?;
        let at = self.field.remove(key)?;
        Ok((fad, at))
    }

    /// Devices currently floating over `tile`, in deployment bucket order.
    #[must_use]
    pub fn fads_at(&self, tile: TilePos) -> &[FadKey] {
        self.field.objects_at((tile.x, tile.y))
    }

    pub fn fad(&self, key: FadKey) -> Option<&Fad> {
        self.fads.get(key)
    }

    pub fn fad_mut(&mut self, key: FadKey) -> Option<&mut Fad> {
        self.fads.get_mut(key)
    }

    #[must_use]
    pub fn owner_of(&self, key: FadKey) -> Option<FisherId> {
        self.fads.get(key).map(Fad::owner)
    }

    #[must_use]
    pub fn position(&self, key: FadKey) -> Option<Point> {
        self.field.position(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FadKey, &Fad)> {
        self.fads.iter()
    }

    /// Total biomass held across every reservoir.
    #[must_use]
    pub fn total_reservoir(&self) -> f64 {
        self.fads.values().map(Fad::total_reservoir).sum()
    }

    /// One day of passive life for everything afloat.
    ///
    /// Devices drift first; whatever the currents carry off the map is lost.
    /// Devices sitting over non-water tiles after the drift strand and are
    /// lost too. The survivors then draw biomass out of the tiles beneath
    /// them. Losses are reported in drift order, then stranding order, each
    /// with the reservoir that went down with the device.
    pub fn step(&mut self, map: &NauticalMap, biology: &mut BiomassGrid, day: Day) -> Vec<FadLoss> {
        let mut losses = Vec::new();

        for exit in self.field.apply_drift(day.0) {
            if let Some(fad) = self.fads.remove(exit.key) {
                losses.push(FadLoss {
                    key: exit.key,
                    owner: fad.owner(),
                    tile: TilePos::from_point(exit.last),
                    biomass: fad.reservoir().to_vec(),
                });
            }
        }

        let stranded: Vec<(FadKey, Point)> = self
            .field
            .iter()
            .filter(|(_, at)| !map.is_water(TilePos::from_point(*at)))
            .collect();
        for (key, at) in stranded {
            if self.field.remove(key).is_ok()
                && let Some(fad) = self.fads.remove(key)
            {
                losses.push(FadLoss {
                    key,
                    owner: fad.owner(),
                    tile: TilePos::from_point(at),
                    biomass: fad.reservoir().to_vec(),
                });
            }
        }

        for (key, at) in self.field.iter() {
            let tile = TilePos::from_point(at);
            if let (Some(fad), Some(cell)) = (self.fads.get_mut(key), biology.cell_mut(tile)) {
                fad.aggregate_fish(cell);
            }
        }

        losses
    }

    /// Where a device's track puts it on day `at`, given positions current
    /// as of `now`. `None` once the track leaves the domain.
    #[must_use]
    pub fn project_tile(&self, key: FadKey, now: Day, at: Day) -> Option<TilePos> {
        let pos = self.position(key)?;
        let landed = self.field.project(pos, now.0, at.0)?;
        Some(TilePos::from_point(landed))
    }

    /// The tiles a device's projected track passes through on each day of
    /// `[from, to]`, stopping early where the track leaves the domain.
    /// Days before `now` resolve to the current position.
    #[must_use]
    pub fn trajectory_tiles(&self, key: FadKey, now: Day, from: Day, to: Day) -> Vec<(Day, TilePos)> {
        let mut out = Vec::new();
        if from > to {
            return out;
        }
        let Some(pos) = self.position(key) else {
            return out;
        };
        let Some(mut at) = self.field.project(pos, now.0, from.0) else {
            return out;
        };
        let mut day = from;
        loop {
            out.push((day, TilePos::from_point(at)));
            if day >= to {
                break;
            }
            match self.field.project(at, day.0, day.0 + 1) {
                Some(next) => at = next,
                None => break,
            }
            day = day.next();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fad::FadTemplate;

    fn template() -> FadTemplate {
        FadTemplate {
            capacity_kg: vec![500.0],
            attraction_rate: 0.05,
        }
    }

    fn eastward(speed: f64) -> Box<dyn Currents> {
        Box::new(move |at: Point, _: u64| at.translated(speed, 0.0))
    }

    fn still() -> Box<dyn Currents> {
        Box::new(|at: Point, _: u64| at)
    }

    #[test]
    fn daily_pass_aggregates_under_surviving_devices() {
        let map = NauticalMap::ocean(8, 8).unwrap();
        let mut biology = BiomassGrid::uniform(8, 8, &[1000.0], &[2000.0]).unwrap();
        let mut fads = FadMap::new(8, 8, still()).unwrap();
        let key = fads
            .insert(template().spawn(FisherId::default(), Day(0)), Point::new(2.5, 2.5))
            .unwrap();

        let losses = fads.step(&map, &mut biology, Day(0));
        assert!(losses.is_empty());
        assert_eq!(fads.fad(key).map(Fad::total_reservoir), Some(50.0));
        assert_eq!(biology.cell(TilePos::new(2, 2)), Some(&[950.0][..]));
        assert_eq!(biology.cell(TilePos::new(3, 2)), Some(&[1000.0][..]));
    }

    #[test]
    fn drifting_off_the_map_is_a_loss_with_the_reservoir_aboard() {
        let map = NauticalMap::ocean(4, 4).unwrap();
        let mut biology = BiomassGrid::uniform(4, 4, &[1000.0], &[2000.0]).unwrap();
        let mut fads = FadMap::new(4, 4, eastward(1.0)).unwrap();
        let owner = FisherId::default();
        let key = fads
            .insert(template().spawn(owner, Day(0)), Point::new(1.5, 1.5))
            .unwrap();
        // Two in-domain days to load the reservoir, then the current takes it.
        fads.step(&map, &mut biology, Day(0));
        fads.step(&map, &mut biology, Day(1));
        let aboard = fads.fad(key).map(Fad::total_reservoir).unwrap();
        assert!(aboard > 0.0);

        let losses = fads.step(&map, &mut biology, Day(2));
        assert_eq!(losses.len(), 1);
        assert_eq!(losses[0].key, key);
        assert_eq!(losses[0].owner, owner);
        assert_eq!(losses[0].tile, TilePos::new(3, 1));
        assert!((losses[0].biomass.iter().sum::<f64>() - aboard).abs() < 1e-9);
        assert!(fads.is_empty());
    }

    #[test]
    fn stranding_on_land_is_a_loss() {
        let mut map = NauticalMap::ocean(6, 6).unwrap();
        map.set_altitude(TilePos::new(3, 2), 40.0);
        let mut biology = BiomassGrid::uniform(6, 6, &[1000.0], &[2000.0]).unwrap();
        let mut fads = FadMap::new(6, 6, eastward(1.0)).unwrap();
        let key = fads
            .insert(template().spawn(FisherId::default(), Day(0)), Point::new(2.5, 2.5))
            .unwrap();

        let losses = fads.step(&map, &mut biology, Day(0));
        assert_eq!(losses.len(), 1);
        assert_eq!(losses[0].key, key);
        assert_eq!(losses[0].tile, TilePos::new(3, 2));
        assert!(fads.is_empty());
        // The stranded device never aggregated from the land tile.
        assert_eq!(biology.cell(TilePos::new(3, 2)), Some(&[1000.0][..]));
    }

    #[test]
    fn removal_hands_back_the_device_and_its_position() {
        let mut fads = FadMap::new(5, 5, still()).unwrap();
        let key = fads
            .insert(template().spawn(FisherId::default(), Day(2)), Point::new(1.25, 3.75))
            .unwrap();
        assert_eq!(fads.fads_at(TilePos::new(1, 3)), &[key]);

        let (fad, at) = fads.remove(key).unwrap();
        assert_eq!(fad.deployed_on(), Day(2));
        assert_eq!(at, Point::new(1.25, 3.75));
        assert!(fads.fads_at(TilePos::new(1, 3)).is_empty());
        assert!(matches!(fads.remove(key), Err(FisheryError::UnknownFad)));
    }

    #[test]
    fn projection_walks_the_track_without_moving_anything() {
        let mut fads = FadMap::new(10, 10, eastward(1.0)).unwrap();
        let key = fads
            .insert(template().spawn(FisherId::default(), Day(0)), Point::new(1.5, 5.5))
            .unwrap();

        assert_eq!(fads.project_tile(key, Day(0), Day(3)), Some(TilePos::new(4, 5)));
        assert_eq!(fads.position(key), Some(Point::new(1.5, 5.5)));
        assert_eq!(fads.project_tile(key, Day(0), Day(9)), None, "track leaves the map");

        let track = fads.trajectory_tiles(key, Day(0), Day(1), Day(3));
        assert_eq!(
            track,
            vec![
                (Day(1), TilePos::new(2, 5)),
                (Day(2), TilePos::new(3, 5)),
                (Day(3), TilePos::new(4, 5)),
            ]
        );
        let truncated = fads.trajectory_tiles(key, Day(0), Day(7), Day(20));
        assert_eq!(
            truncated,
            vec![(Day(7), TilePos::new(8, 5)), (Day(8), TilePos::new(9, 5))]
        );
    }
}
