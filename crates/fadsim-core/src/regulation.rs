//! General fishing regulations: composable rules over place and season.

use serde::{Deserialize, Serialize};

use crate::geography::TilePos;

/// Inclusive day-of-year window (1-based). A window whose end precedes its
/// start wraps across the turn of the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub start: u32,
    pub end: u32,
}

impl SeasonWindow {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn contains(self, day_of_year: u32) -> bool {
        if self.start <= self.end {
            self.start <= day_of_year && day_of_year <= self.end
        } else {
            day_of_year >= self.start || day_of_year <= self.end
        }
    }
}

/// Inclusive rectangle of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaBounds {
    pub min: TilePos,
    pub max: TilePos,
}

impl AreaBounds {
    #[must_use]
    pub const fn new(min: TilePos, max: TilePos) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn contains(self, tile: TilePos) -> bool {
        self.min.x <= tile.x && tile.x <= self.max.x && self.min.y <= tile.y && tile.y <= self.max.y
    }
}

/// A vessel's general regulation, built as a tree.
///
/// Leaves either permit everything, ban fishing outright, or fence off an
/// area. `Temporary` applies its inner regulation only inside a seasonal
/// window. `Composite` permits an action only when every child does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Regulation {
    OpenAccess,
    NoFishing,
    Protected(AreaBounds),
    Temporary {
        window: SeasonWindow,
        inner: Box<Regulation>,
    },
    Composite(Vec<Regulation>),
}

impl Regulation {
    /// Seasonal closure banning all fishing inside `window`.
    #[must_use]
    pub fn closure(window: SeasonWindow) -> Self {
        Self::Temporary {
            window,
            inner: Box::new(Self::NoFishing),
        }
    }

    /// Whether fishing at `tile` is permitted on `day_of_year`.
    #[must_use]
    pub fn can_fish_here(&self, tile: TilePos, day_of_year: u32) -> bool {
        match self {
            Self::OpenAccess => true,
            Self::NoFishing => false,
            Self::Protected(area) => !area.contains(tile),
            Self::Temporary { window, inner } => {
                !window.contains(day_of_year) || inner.can_fish_here(tile, day_of_year)
            }
            Self::Composite(children) => {
                children.iter().all(|r| r.can_fish_here(tile, day_of_year))
            }
        }
    }

    /// Whether any part of the tree bans fishing everywhere on
    /// `day_of_year`, regardless of location.
    #[must_use]
    pub fn no_fishing_at(&self, day_of_year: u32) -> bool {
        match self {
            Self::NoFishing => true,
            Self::OpenAccess | Self::Protected(_) => false,
            Self::Temporary { window, inner } => {
                window.contains(day_of_year) && inner.no_fishing_at(day_of_year)
            }
            Self::Composite(children) => children.iter().any(|r| r.no_fishing_at(day_of_year)),
        }
    }
}

impl Default for Regulation {
    fn default() -> Self {
        Self::OpenAccess
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_wrap_across_the_year_end() {
        let plain = SeasonWindow::new(210, 281);
        assert!(plain.contains(210));
        assert!(plain.contains(281));
        assert!(!plain.contains(209));
        assert!(!plain.contains(282));

        let wrapping = SeasonWindow::new(313, 19);
        assert!(wrapping.contains(313));
        assert!(wrapping.contains(365));
        assert!(wrapping.contains(1));
        assert!(wrapping.contains(19));
        assert!(!wrapping.contains(20));
        assert!(!wrapping.contains(312));
    }

    #[test]
    fn protected_area_blocks_only_inside_its_rectangle() {
        let reg = Regulation::Protected(AreaBounds::new(TilePos::new(2, 2), TilePos::new(4, 5)));
        assert!(!reg.can_fish_here(TilePos::new(3, 4), 100));
        assert!(!reg.can_fish_here(TilePos::new(2, 2), 100));
        assert!(!reg.can_fish_here(TilePos::new(4, 5), 100));
        assert!(reg.can_fish_here(TilePos::new(5, 5), 100));
        assert!(reg.can_fish_here(TilePos::new(1, 3), 100));
    }

    #[test]
    fn temporary_regulation_sleeps_outside_its_window() {
        let closure = Regulation::closure(SeasonWindow::new(210, 281));
        let tile = TilePos::new(0, 0);
        assert!(closure.can_fish_here(tile, 209));
        assert!(!closure.can_fish_here(tile, 210));
        assert!(!closure.can_fish_here(tile, 281));
        assert!(closure.can_fish_here(tile, 282));
    }

    #[test]
    fn composite_forbids_when_any_child_does() {
        let reg = Regulation::Composite(vec![
            Regulation::Protected(AreaBounds::new(TilePos::new(0, 0), TilePos::new(1, 1))),
            Regulation::closure(SeasonWindow::new(100, 120)),
        ]);
        assert!(reg.can_fish_here(TilePos::new(5, 5), 50));
        assert!(!reg.can_fish_here(TilePos::new(0, 1), 50), "inside the fence");
        assert!(!reg.can_fish_here(TilePos::new(5, 5), 110), "inside the closure");
        assert!(Regulation::Composite(vec![]).can_fish_here(TilePos::new(0, 0), 1));
    }

    #[test]
    fn blanket_ban_detection_descends_the_tree() {
        let reg = Regulation::Composite(vec![
            Regulation::Protected(AreaBounds::new(TilePos::new(0, 0), TilePos::new(9, 9))),
            Regulation::closure(SeasonWindow::new(313, 19)),
        ]);
        assert!(!reg.no_fishing_at(100), "a fenced area is not a blanket ban");
        assert!(reg.no_fishing_at(313));
        assert!(reg.no_fishing_at(5));
        assert!(!reg.no_fishing_at(30));
        assert!(!Regulation::OpenAccess.no_fishing_at(1));
        assert!(Regulation::NoFishing.no_fishing_at(1));
    }

    #[test]
    fn nested_temporary_windows_must_both_be_active() {
        let reg = Regulation::Temporary {
            window: SeasonWindow::new(100, 200),
            inner: Box::new(Regulation::Temporary {
                window: SeasonWindow::new(150, 250),
                inner: Box::new(Regulation::NoFishing),
            }),
        };
        assert!(!reg.no_fishing_at(120));
        assert!(reg.no_fishing_at(160));
        assert!(!reg.no_fishing_at(220));
    }
}
