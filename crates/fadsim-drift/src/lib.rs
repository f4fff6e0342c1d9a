//! Drift-field tracking for objects carried by ocean currents.
//!
//! A [`DriftField`] keeps one continuous position per tracked key, advances
//! every position through an externally supplied [`Currents`] function, and
//! maintains a discretized cell index for O(1) "what is floating here"
//! lookups. Objects whose drift carries them outside the field's domain are
//! deregistered and reported to the caller as [`DriftExit`] records; leaving
//! the domain is an expected outcome, not an error.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by the drift field.
#[derive(Debug, Error)]
pub enum DriftError {
    /// Configuration values that cannot be used (e.g., a zero-sized domain).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// An insert was attempted for a key that is already tracked.
    #[error("object is already tracked by the drift field")]
    AlreadyTracked,
    /// A lookup or removal referenced a key the field does not track.
    #[error("object is not tracked by the drift field")]
    NotTracked,
    /// An insert was attempted at a position outside the field domain.
    #[error("position ({x}, {y}) lies outside the field domain")]
    OutOfDomain { x: f64, y: f64 },
}

/// Keys usable as drift-field handles.
pub trait DriftKey: Copy + Eq + Hash {}

impl<K: Copy + Eq + Hash> DriftKey for K {}

/// A continuous position, in tile units.
///
/// The integer part of each coordinate names the grid cell the position
/// falls in; the fractional part is the sub-cell offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offset this point by a displacement vector.
    #[must_use]
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Externally supplied current field.
///
/// `advect` maps an object's position at `step` to its position at
/// `step + 1`. Implementations must be pure with respect to their inputs so
/// trajectories can be projected forward without mutating anything.
pub trait Currents: Send + Sync {
    fn advect(&self, at: Point, step: u64) -> Point;
}

impl<F> Currents for F
where
    F: Fn(Point, u64) -> Point + Send + Sync,
{
    fn advect(&self, at: Point, step: u64) -> Point {
        self(at, step)
    }
}

/// Record of an object that drifted out of the domain during
/// [`DriftField::apply_drift`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftExit<K> {
    pub key: K,
    /// The object's last in-domain position, before the exiting move.
    pub last: Point,
}

/// Registry of continuously-positioned objects advanced by a current field.
///
/// Positions live in parallel columns with a key-to-slot map so iteration
/// order is a deterministic function of the insert/remove history, never of
/// hash state. The cell index is updated incrementally on insert/remove and
/// rebuilt wholesale by `apply_drift`, so lookups between drift passes see
/// objects inserted since the last pass.
pub struct DriftField<K: DriftKey> {
    width: u32,
    height: u32,
    currents: Box<dyn Currents>,
    keys: Vec<K>,
    positions: Vec<Point>,
    slots: HashMap<K, usize>,
    buckets: HashMap<(u32, u32), Vec<K>>,
}

impl<K: DriftKey + fmt::Debug> fmt::Debug for DriftField<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriftField")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("tracked", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl<K: DriftKey> DriftField<K> {
    /// Create a field over a `width` x `height` cell domain. Valid positions
    /// are `[0, width) x [0, height)`.
    pub fn new(width: u32, height: u32, currents: Box<dyn Currents>) -> Result<Self, DriftError> {
        if width == 0 || height == 0 {
            return Err(DriftError::InvalidConfig(
                "drift field domain must have nonzero width and height",
            ));
        }
        Ok(Self {
            width,
            height,
            currents,
            keys: Vec::new(),
            positions: Vec::new(),
            slots: HashMap::new(),
            buckets: HashMap::new(),
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
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(&key)
    }

    /// Current position of a tracked object.
    #[must_use]
    pub fn position(&self, key: K) -> Option<Point> {
        self.slots.get(&key).map(|&slot| self.positions[slot])
    }

    /// The cell a position falls in, or `None` outside the domain.
    #[must_use]
    pub fn cell_of(&self, at: Point) -> Option<(u32, u32)> {
        if at.x >= 0.0 && at.y >= 0.0 && at.x < f64::from(self.width) && at.y < f64::from(self.height)
        {
            Some((at.x as u32, at.y as u32))
        } else {
            None
        }
    }

    /// Start tracking `key` at `at`.
    pub fn insert(&mut self, key: K, at: Point) -> Result<(), DriftError> {
        if self.slots.contains_key(&key) {
            return Err(DriftError::AlreadyTracked);
        }
        let cell = self
            .cell_of(at)
            .ok_or(DriftError::OutOfDomain { x: at.x, y: at.y })?;
        self.slots.insert(key, self.keys.len());
        self.keys.push(key);
        self.positions.push(at);
        self.buckets.entry(cell).or_default().push(key);
        self.debug_assert_coherent();
        Ok(())
    }

    /// Stop tracking `key`, returning its last position. Removing an
    /// untracked key is an invariant violation surfaced as an error.
    pub fn remove(&mut self, key: K) -> Result<Point, DriftError> {
        let slot = self.slots.remove(&key).ok_or(DriftError::NotTracked)?;
        let at = self.positions[slot];
        if let Some(cell) = self.cell_of(at) {
            if let Some(bucket) = self.buckets.get_mut(&cell) {
                bucket.retain(|k| *k != key);
                if bucket.is_empty() {
                    self.buckets.remove(&cell);
                }
            }
        }
        self.keys.swap_remove(slot);
        self.positions.swap_remove(slot);
        if slot < self.keys.len() {
            self.slots.insert(self.keys[slot], slot);
        }
        self.debug_assert_coherent();
        Ok(at)
    }

    /// Objects whose position currently discretizes to `cell`. Returns an
    /// empty slice for cells with nothing afloat.
    #[must_use]
    pub fn objects_at(&self, cell: (u32, u32)) -> &[K] {
        self.buckets.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// Advance every tracked object one step through the current field.
    ///
    /// Objects carried outside the domain are deregistered and reported in
    /// slot order, each carrying its last in-domain position. The cell index
    /// is rebuilt from the surviving positions.
    pub fn apply_drift(&mut self, step: u64) -> Vec<DriftExit<K>> {
        let mut exits = Vec::new();
        for slot in 0..self.keys.len() {
            let old = self.positions[slot];
            let next = self.currents.advect(old, step);
            if self.cell_of(next).is_some() {
                self.positions[slot] = next;
            } else {
                exits.push(DriftExit {
                    key: self.keys[slot],
                    last: old,
                });
            }
        }
        for exit in &exits {
            if let Some(slot) = self.slots.remove(&exit.key) {
                self.keys.swap_remove(slot);
                self.positions.swap_remove(slot);
                if slot < self.keys.len() {
                    self.slots.insert(self.keys[slot], slot);
                }
            }
        }
        self.rebuild_buckets();
        self.debug_assert_coherent();
        exits
    }

    /// Project a position forward from `from_step` (exclusive of drift
    /// already applied) to `to_step` without touching field state. Returns
    /// `None` once the trajectory leaves the domain.
    #[must_use]
    pub fn project(&self, from: Point, from_step: u64, to_step: u64) -> Option<Point> {
        let mut at = from;
        for step in from_step..to_step {
            at = self.currents.advect(at, step);
            self.cell_of(at)?;
        }
        Some(at)
    }

    /// Iterate `(key, position)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, Point)> + '_ {
        self.keys
            .iter()
            .copied()
            .zip(self.positions.iter().copied())
    }

    fn rebuild_buckets(&mut self) {
        self.buckets.clear();
        for slot in 0..self.keys.len() {
            if let Some(cell) = self.cell_of(self.positions[slot]) {
                self.buckets.entry(cell).or_default().push(self.keys[slot]);
            }
        }
    }

    fn debug_assert_coherent(&self) {
        debug_assert_eq!(self.keys.len(), self.positions.len());
        debug_assert_eq!(self.keys.len(), self.slots.len());
        #[cfg(debug_assertions)]
        {
            let bucketed: usize = self.buckets.values().map(Vec::len).sum();
            debug_assert_eq!(bucketed, self.keys.len());
            for (slot, key) in self.keys.iter().enumerate() {
                debug_assert_eq!(self.slots.get(key), Some(&slot));
            }
        }
    }
}
