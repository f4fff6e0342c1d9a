//! Tile geography: the nautical grid and water/land queries.

use fadsim_drift::Point;
use serde::{Deserialize, Serialize};

/// Discrete grid coordinate of a sea tile.
///
/// Ordering is row-major (`y` first, then `x`) so that sorted containers
/// keyed by tile iterate in a stable, reading-order sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub y: u32,
    pub x: u32,
}

impl TilePos {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { y, x }
    }

    /// Tile containing a continuous position. The caller is responsible for
    /// the point being inside the grid domain.
    #[must_use]
    pub fn from_point(point: Point) -> Self {
        Self {
            y: point.y.floor() as u32,
            x: point.x.floor() as u32,
        }
    }

    /// Centre of the tile in continuous coordinates.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(f64::from(self.x) + 0.5, f64::from(self.y) + 0.5)
    }
}

/// Bathymetry raster. Negative altitude is water, everything else is land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NauticalMap {
    width: u32,
    height: u32,
    altitude: Vec<f64>,
}

impl NauticalMap {
    /// Construct a map with every tile at `altitude`.
    pub fn new(width: u32, height: u32, altitude: f64) -> Result<Self, crate::FisheryError> {
        if width == 0 || height == 0 {
            return Err(crate::FisheryError::InvalidConfig(
                "nautical map dimensions must be non-zero",
            ));
        }
        Ok(Self {
            width,
            height,
            altitude: vec![altitude; (width as usize) * (height as usize)],
        })
    }

    /// All-water map at a uniform depth of 1000m.
    pub fn ocean(width: u32, height: u32) -> Result<Self, crate::FisheryError> {
        Self::new(width, height, -1000.0)
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns the flat index for `(x, y)` without bounds checks.
    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    #[must_use]
    pub fn in_bounds(&self, tile: TilePos) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    /// Altitude of a tile, if it lies on the map.
    pub fn altitude(&self, tile: TilePos) -> Option<f64> {
        if self.in_bounds(tile) {
            Some(self.altitude[self.offset(tile.x, tile.y)])
        } else {
            None
        }
    }

    /// Overwrite the altitude of a tile. Out-of-bounds writes are ignored.
    pub fn set_altitude(&mut self, tile: TilePos, altitude: f64) {
        if self.in_bounds(tile) {
            let idx = self.offset(tile.x, tile.y);
            self.altitude[idx] = altitude;
        }
    }

    /// Whether a tile is navigable water. Tiles off the map are not.
    #[must_use]
    pub fn is_water(&self, tile: TilePos) -> bool {
        self.altitude(tile).is_some_and(|a| a < 0.0)
    }

    /// Water tiles among the eight neighbours of `tile`, in reading order
    /// (top row left to right, then middle, then bottom).
    #[must_use]
    pub fn water_neighbors(&self, tile: TilePos) -> Vec<TilePos> {
        let mut out = Vec::with_capacity(8);
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = i64::from(tile.x) + dx;
                let ny = i64::from(tile.y) + dy;
                if nx < 0 || ny < 0 {
                    continue;
                }
                let neighbor = TilePos::new(nx as u32, ny as u32);
                if self.is_water(neighbor) {
                    out.push(neighbor);
                }
            }
        }
        out
    }
}
