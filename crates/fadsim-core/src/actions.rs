//! Purse-seiner actions and the gates deciding what can happen.

use serde::{Deserialize, Serialize};

use crate::fad_manager::FadManager;
use crate::fad_map::FadMap;
use crate::geography::{NauticalMap, TilePos};
use crate::regulation::Regulation;
use crate::rules::RuleContext;
use crate::{Day, FadKey, FisherId};

/// The four things a purse seiner can do in a day at sea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Drop a new device at the current tile.
    Deploy,
    /// Set on a device the vessel itself owns.
    OwnFadSet,
    /// Set on a device another vessel owns.
    OtherFadSet,
    /// Set on a free-swimming school, no device involved.
    UnassociatedSet,
}

impl ActionKind {
    pub const ALL: [Self; 4] = [
        Self::Deploy,
        Self::OwnFadSet,
        Self::OtherFadSet,
        Self::UnassociatedSet,
    ];

    #[must_use]
    pub const fn is_set(self) -> bool {
        matches!(self, Self::OwnFadSet | Self::OtherFadSet | Self::UnassociatedSet)
    }

    #[must_use]
    pub const fn is_fad_set(self) -> bool {
        matches!(self, Self::OwnFadSet | Self::OtherFadSet)
    }

    #[must_use]
    pub const fn family(self) -> ActionFamily {
        match self {
            Self::Deploy => ActionFamily::Deploy,
            Self::OwnFadSet | Self::OtherFadSet => ActionFamily::FadSet,
            Self::UnassociatedSet => ActionFamily::UnassociatedSet,
        }
    }
}

/// Grouping used by the damping counters: both fad-set kinds share one
/// family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionFamily {
    Deploy,
    FadSet,
    UnassociatedSet,
}

impl ActionFamily {
    pub const COUNT: usize = 3;

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Deploy => 0,
            Self::FadSet => 1,
            Self::UnassociatedSet => 2,
        }
    }
}

/// A concrete action proposal: who, what, where, when, and on which device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub actor: FisherId,
    pub tile: TilePos,
    pub day: Day,
    /// The device a fad set targets; `None` for the other kinds.
    pub target: Option<FadKey>,
}

impl Action {
    #[must_use]
    pub const fn deploy(actor: FisherId, tile: TilePos, day: Day) -> Self {
        Self {
            kind: ActionKind::Deploy,
            actor,
            tile,
            day,
            target: None,
        }
    }

    #[must_use]
    pub const fn fad_set(actor: FisherId, tile: TilePos, day: Day, target: FadKey, own: bool) -> Self {
        Self {
            kind: if own {
                ActionKind::OwnFadSet
            } else {
                ActionKind::OtherFadSet
            },
            actor,
            tile,
            day,
            target: Some(target),
        }
    }

    #[must_use]
    pub const fn unassociated_set(actor: FisherId, tile: TilePos, day: Day) -> Self {
        Self {
            kind: ActionKind::UnassociatedSet,
            actor,
            tile,
            day,
            target: None,
        }
    }

    /// Physical feasibility: water underneath, stock to draw on, the target
    /// device actually here. Regulations play no part.
    #[must_use]
    pub fn is_possible(&self, ctx: &ActionContext<'_>) -> bool {
        match self.kind {
            ActionKind::Deploy => ctx.map.is_water(self.tile) && ctx.manager.can_deploy(),
            ActionKind::OwnFadSet | ActionKind::OtherFadSet => self
                .target
                .is_some_and(|key| ctx.fads.fads_at(self.tile).contains(&key)),
            ActionKind::UnassociatedSet => ctx.map.is_water(self.tile),
        }
    }

    /// Legality: the general regulation tree and every action rule agree.
    #[must_use]
    pub fn is_allowed(&self, ctx: &ActionContext<'_>) -> bool {
        let day_of_year = self.day.of_year(ctx.days_per_year);
        if !ctx.general.can_fish_here(self.tile, day_of_year) {
            return false;
        }
        let rule_ctx = RuleContext {
            general: ctx.general,
            deployed_fads: ctx.manager.deployed_count(),
            days_per_year: ctx.days_per_year,
        };
        !ctx.manager.rules().is_forbidden(self, &rule_ctx)
    }

    /// An action happens when it is physically possible and, unless the
    /// actor ignores regulations, also legal.
    #[must_use]
    pub fn can_happen(&self, ctx: &ActionContext<'_>, cheater: bool) -> bool {
        self.is_possible(ctx) && (cheater || self.is_allowed(ctx))
    }
}

/// Read-only world slice the gates consult.
pub struct ActionContext<'a> {
    pub map: &'a NauticalMap,
    pub fads: &'a FadMap,
    pub manager: &'a FadManager,
    pub general: &'a Regulation,
    pub days_per_year: u32,
}
