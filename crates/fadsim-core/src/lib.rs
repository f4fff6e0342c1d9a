//! Core state and daily step pipeline for the purse-seine fishery model.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

pub mod actions;
pub mod biology;
pub mod fad;
pub mod fad_manager;
pub mod fad_map;
pub mod geography;
pub mod policy;
pub mod regulation;
pub mod rules;

pub use actions::{Action, ActionContext, ActionFamily, ActionKind};
pub use biology::{BiomassGrid, CatchValuer, FixedPrices, Hold, Species, SpeciesTable};
pub use fad::{Fad, FadTemplate};
pub use fad_manager::{ActionObserver, BiomassLostObserver, FadManager};
pub use fad_map::{FadLoss, FadMap};
pub use fadsim_drift::{Currents, DriftError, Point};
pub use geography::{NauticalMap, TilePos};
pub use policy::{
    FishingPolicy, PolicyRegistry, PolicyView, PropensityParams, PropensityPolicy, RandomPolicy,
    propensity,
};
pub use regulation::{AreaBounds, Regulation, SeasonWindow};
pub use rules::{
    ActionRule, ActionRuleSet, ActiveFadLimitRule, ClosureBufferRule, RuleContext, SetLimitRule,
};

new_key_type! {
    /// Stable handle for floating devices backed by a generational slot map.
    pub struct FadKey;

    /// Stable handle for vessels backed by a generational slot map.
    pub struct FisherId;
}

/// Convenience alias for associating side data with vessels.
pub type FisherMap<T> = SecondaryMap<FisherId, T>;

/// Simulation calendar (days processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Day(pub u64);

impl Day {
    /// Returns the next calendar day.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the calendar back to day zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// One-based day of the regulatory year this day falls on.
    #[must_use]
    pub const fn of_year(self, days_per_year: u32) -> u32 {
        (self.0 % days_per_year as u64) as u32 + 1
    }
}

/// Errors emitted by the fishery core.
#[derive(Debug, Error)]
pub enum FisheryError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A drift-field operation failed.
    #[error(transparent)]
    Drift(#[from] DriftError),
    /// A lookup referenced a device the map does not hold.
    #[error("no such floating device")]
    UnknownFad,
    /// A lookup referenced a vessel the fishery does not hold.
    #[error("no such vessel")]
    UnknownFisher,
    /// A vessel tried to account for a device it has not deployed.
    #[error("device is not on this vessel's deployed list")]
    FadNotDeployed,
}

/// One species as configured, in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub code: String,
    pub name: String,
    /// Sale price per kilogram landed.
    pub price_per_kg: f64,
    /// Biomass seeded into every water tile at boot.
    pub initial_tile_biomass_kg: f64,
    /// Carrying capacity of every tile.
    pub tile_capacity_kg: f64,
}

/// Yearly allowance for a group of action kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLimitSpec {
    pub kinds: Vec<ActionKind>,
    pub limit: u64,
}

/// Which of the two seasonal closures a vessel observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureChoice {
    A,
    B,
}

/// Static configuration for a fishery world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FisheryConfig {
    /// Width of the ocean grid in tiles.
    pub grid_width: u32,
    /// Height of the ocean grid in tiles.
    pub grid_height: u32,
    /// Length of the regulatory year in days.
    pub days_per_year: u32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// How many day summaries to retain.
    pub history_capacity: usize,
    /// The species in play, in index order.
    pub species: Vec<SpeciesSpec>,
    /// Blueprint for every device handed to a vessel.
    pub fad_template: FadTemplate,
    /// Devices aboard each vessel at boot.
    pub initial_fad_stock: u32,
    /// Most devices a vessel may have afloat at once, if capped.
    pub active_fad_limit: Option<usize>,
    /// Yearly set allowances, if any.
    pub set_limits: Vec<SetLimitSpec>,
    /// Days ahead of a blanket closure in which deployments stop; 0 disables.
    pub closure_deploy_buffer_days: u64,
    /// Day-of-year window of the first seasonal closure.
    pub closure_a: SeasonWindow,
    /// Day-of-year window of the second seasonal closure.
    pub closure_b: SeasonWindow,
    /// Window in which the corralito rectangle shuts.
    pub corralito_window: SeasonWindow,
    /// The corralito rectangle.
    pub corralito_area: AreaBounds,
    /// Permanently protected rectangle, if any.
    pub protected_area: Option<AreaBounds>,
    /// Hour budget per trip; sailing burns 24 per day, actions their duration.
    pub trip_hours: f64,
    /// Hold capacity per vessel in kilograms.
    pub hold_capacity_kg: f64,
    /// Hold fullness fraction that sends a vessel home.
    pub hold_full_fraction: f64,
    /// Hours charged for dropping a device.
    pub deploy_duration_hours: f64,
    /// Floor on sampled set durations in hours.
    pub min_set_duration_hours: f64,
    /// Mean sampled set duration in hours.
    pub avg_set_duration_hours: f64,
    /// Spread of sampled set durations in hours.
    pub std_set_duration_hours: f64,
    /// Chance a set closes successfully.
    pub successful_set_probability: f64,
    /// Empirical per-species catch rows drawn for unassociated sets.
    pub unassociated_set_samples: Vec<Vec<f64>>,
}

impl Default for FisheryConfig {
    fn default() -> Self {
        Self {
            grid_width: 60,
            grid_height: 40,
            days_per_year: 365,
            rng_seed: None,
            history_capacity: 256,
            species: vec![
                SpeciesSpec {
                    code: "BET".to_owned(),
                    name: "Bigeye tuna".to_owned(),
                    price_per_kg: 2.2,
                    initial_tile_biomass_kg: 5_000.0,
                    tile_capacity_kg: 10_000.0,
                },
                SpeciesSpec {
                    code: "SKJ".to_owned(),
                    name: "Skipjack tuna".to_owned(),
                    price_per_kg: 1.1,
                    initial_tile_biomass_kg: 8_000.0,
                    tile_capacity_kg: 16_000.0,
                },
                SpeciesSpec {
                    code: "YFT".to_owned(),
                    name: "Yellowfin tuna".to_owned(),
                    price_per_kg: 1.8,
                    initial_tile_biomass_kg: 6_000.0,
                    tile_capacity_kg: 12_000.0,
                },
            ],
            fad_template: FadTemplate {
                capacity_kg: vec![2_000.0, 3_000.0, 2_500.0],
                attraction_rate: 0.05,
            },
            initial_fad_stock: 25,
            active_fad_limit: Some(315),
            set_limits: Vec::new(),
            closure_deploy_buffer_days: 15,
            // Jul 29 through Oct 8.
            closure_a: SeasonWindow::new(210, 281),
            // Nov 9 through Jan 19, wrapping the year end.
            closure_b: SeasonWindow::new(313, 19),
            // Oct 9 through Nov 8.
            corralito_window: SeasonWindow::new(282, 312),
            corralito_area: AreaBounds::new(TilePos::new(36, 16), TilePos::new(50, 23)),
            protected_area: Some(AreaBounds::new(TilePos::new(6, 18), TilePos::new(10, 22))),
            trip_hours: 480.0,
            hold_capacity_kg: 90_000.0,
            hold_full_fraction: 0.99,
            deploy_duration_hours: 1.0,
            min_set_duration_hours: 1.0,
            avg_set_duration_hours: 3.2,
            std_set_duration_hours: 1.1,
            successful_set_probability: 0.9,
            unassociated_set_samples: vec![
                vec![150.0, 18_000.0, 2_500.0],
                vec![800.0, 9_500.0, 6_000.0],
                vec![50.0, 26_000.0, 1_200.0],
            ],
        }
    }
}

impl FisheryConfig {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), FisheryError> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(FisheryError::InvalidConfig("grid dimensions must be non-zero"));
        }
        if self.days_per_year == 0 {
            return Err(FisheryError::InvalidConfig("days_per_year must be non-zero"));
        }
        if self.history_capacity == 0 {
            return Err(FisheryError::InvalidConfig("history_capacity must be non-zero"));
        }
        if self.species.is_empty() {
            return Err(FisheryError::InvalidConfig("at least one species is required"));
        }
        for species in &self.species {
            if !species.price_per_kg.is_finite() || species.price_per_kg < 0.0 {
                return Err(FisheryError::InvalidConfig(
                    "species prices must be finite and non-negative",
                ));
            }
            if species.initial_tile_biomass_kg < 0.0
                || species.tile_capacity_kg < species.initial_tile_biomass_kg
            {
                return Err(FisheryError::InvalidConfig(
                    "species biomass must fit under its tile capacity",
                ));
            }
        }
        self.fad_template.validate()?;
        if self.fad_template.capacity_kg.len() != self.species.len() {
            return Err(FisheryError::InvalidConfig(
                "device template needs one capacity per configured species",
            ));
        }
        for window in [
            self.closure_a,
            self.closure_b,
            self.corralito_window,
        ] {
            if window.start == 0
                || window.end == 0
                || window.start > self.days_per_year
                || window.end > self.days_per_year
            {
                return Err(FisheryError::InvalidConfig(
                    "season windows must use one-based days inside the year",
                ));
            }
        }
        for area in self
            .protected_area
            .iter()
            .chain(std::iter::once(&self.corralito_area))
        {
            if area.min.x > area.max.x
                || area.min.y > area.max.y
                || area.max.x >= self.grid_width
                || area.max.y >= self.grid_height
            {
                return Err(FisheryError::InvalidConfig(
                    "regulated areas must be well-formed rectangles on the grid",
                ));
            }
        }
        for spec in &self.set_limits {
            if spec.kinds.is_empty() {
                return Err(FisheryError::InvalidConfig(
                    "set limits must name at least one action kind",
                ));
            }
        }
        if !self.trip_hours.is_finite() || self.trip_hours <= 0.0 {
            return Err(FisheryError::InvalidConfig("trip_hours must be positive"));
        }
        if !self.hold_capacity_kg.is_finite() || self.hold_capacity_kg <= 0.0 {
            return Err(FisheryError::InvalidConfig("hold capacity must be positive"));
        }
        if !(0.0..=1.0).contains(&self.hold_full_fraction) || self.hold_full_fraction == 0.0 {
            return Err(FisheryError::InvalidConfig(
                "hold_full_fraction must lie in (0, 1]",
            ));
        }
        if self.deploy_duration_hours < 0.0
            || self.min_set_duration_hours < 0.0
            || !self.avg_set_duration_hours.is_finite()
            || self.std_set_duration_hours < 0.0
        {
            return Err(FisheryError::InvalidConfig(
                "action durations must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.successful_set_probability) {
            return Err(FisheryError::InvalidConfig(
                "successful_set_probability must lie in [0, 1]",
            ));
        }
        for row in &self.unassociated_set_samples {
            if row.len() != self.species.len() {
                return Err(FisheryError::InvalidConfig(
                    "catch sample rows need one figure per species",
                ));
            }
            if row.iter().any(|kg| !kg.is_finite() || *kg < 0.0) {
                return Err(FisheryError::InvalidConfig(
                    "catch samples must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    #[must_use]
    pub fn species_table(&self) -> SpeciesTable {
        SpeciesTable::new(
            self.species
                .iter()
                .map(|s| (s.code.as_str(), s.name.as_str())),
        )
    }

    #[must_use]
    pub fn prices(&self) -> FixedPrices {
        FixedPrices::new(self.species.iter().map(|s| s.price_per_kg).collect())
    }

    /// The general regulation tree a vessel observing `closure` sails under.
    #[must_use]
    pub fn build_regulation(&self, closure: ClosureChoice) -> Regulation {
        let mut children = Vec::new();
        if let Some(area) = self.protected_area {
            children.push(Regulation::Protected(area));
        }
        children.push(Regulation::Temporary {
            window: self.corralito_window,
            inner: Box::new(Regulation::Protected(self.corralito_area)),
        });
        let window = match closure {
            ClosureChoice::A => self.closure_a,
            ClosureChoice::B => self.closure_b,
        };
        children.push(Regulation::closure(window));
        Regulation::Composite(children)
    }

    /// The action-specific rule set every vessel starts with.
    #[must_use]
    pub fn build_rule_set(&self) -> ActionRuleSet {
        let mut rules = ActionRuleSet::new();
        for spec in &self.set_limits {
            rules.push(Box::new(SetLimitRule::new(spec.kinds.clone(), spec.limit)));
        }
        if let Some(limit) = self.active_fad_limit {
            rules.push(Box::new(ActiveFadLimitRule::new(limit)));
        }
        if self.closure_deploy_buffer_days > 0 {
            rules.push(Box::new(ClosureBufferRule::new(
                self.closure_deploy_buffer_days,
            )));
        }
        rules
    }
}

/// Everything needed to put a new vessel in the water.
pub struct FisherSpec {
    pub port: TilePos,
    pub cheater: bool,
    pub closure: ClosureChoice,
    pub policy: Box<dyn FishingPolicy>,
    /// Perceived deployment value per tile; tiles absent score zero.
    pub deployment_values: HashMap<TilePos, f64>,
}

impl FisherSpec {
    #[must_use]
    pub fn new(port: TilePos, closure: ClosureChoice, policy: Box<dyn FishingPolicy>) -> Self {
        Self {
            port,
            cheater: false,
            closure,
            policy,
            deployment_values: HashMap::new(),
        }
    }
}

/// One purse seiner and everything it carries.
pub struct Fisher {
    location: TilePos,
    port: TilePos,
    at_sea: bool,
    hours_left: f64,
    cheater: bool,
    hold: Hold,
    regulation: Regulation,
    deployment_values: HashMap<TilePos, f64>,
    manager: FadManager,
    policy: Box<dyn FishingPolicy>,
}

impl fmt::Debug for Fisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fisher")
            .field("location", &self.location)
            .field("at_sea", &self.at_sea)
            .field("hours_left", &self.hours_left)
            .field("cheater", &self.cheater)
            .field("policy", &self.policy.kind())
            .finish_non_exhaustive()
    }
}

impl Fisher {
    #[must_use]
    pub const fn location(&self) -> TilePos {
        self.location
    }

    #[must_use]
    pub const fn port(&self) -> TilePos {
        self.port
    }

    #[must_use]
    pub const fn is_at_sea(&self) -> bool {
        self.at_sea
    }

    #[must_use]
    pub const fn hours_left(&self) -> f64 {
        self.hours_left
    }

    #[must_use]
    pub const fn is_cheater(&self) -> bool {
        self.cheater
    }

    #[must_use]
    pub const fn hold(&self) -> &Hold {
        &self.hold
    }

    #[must_use]
    pub const fn regulation(&self) -> &Regulation {
        &self.regulation
    }

    #[must_use]
    pub const fn manager(&self) -> &FadManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut FadManager {
        &mut self.manager
    }

    #[must_use]
    pub const fn deployment_values(&self) -> &HashMap<TilePos, f64> {
        &self.deployment_values
    }

    pub fn deployment_values_mut(&mut self) -> &mut HashMap<TilePos, f64> {
        &mut self.deployment_values
    }

    #[must_use]
    pub fn policy_kind(&self) -> &'static str {
        self.policy.kind()
    }
}

/// Events emitted after processing one world day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DayEvents {
    pub day: Day,
    pub deployments: u32,
    pub fad_sets: u32,
    pub unassociated_sets: u32,
    pub fads_lost: u32,
    pub landings_kg: f64,
}

/// Summary retained in the world history each day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: Day,
    pub fishers_at_sea: usize,
    pub fads_deployed: usize,
    pub fads_in_stock: u64,
    pub fads_lost: u64,
    pub fads_consumed: u64,
    pub fad_biomass_kg: f64,
    pub tile_biomass_kg: f64,
    pub hold_biomass_kg: f64,
}

#[derive(Default)]
struct ActionTally {
    deployments: u32,
    fad_sets: u32,
    unassociated_sets: u32,
}

/// The complete simulation state.
pub struct FisheryState {
    config: FisheryConfig,
    day: Day,
    rng: SmallRng,
    species: SpeciesTable,
    grid: NauticalMap,
    biomass: BiomassGrid,
    fads: FadMap,
    fishers: SlotMap<FisherId, Fisher>,
    fisher_order: Vec<FisherId>,
    valuer: Box<dyn CatchValuer>,
    set_duration: Normal<f64>,
    history: VecDeque<DaySummary>,
}

impl fmt::Debug for FisheryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FisheryState")
            .field("day", &self.day)
            .field("fishers", &self.fishers.len())
            .field("fads", &self.fads.len())
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl FisheryState {
    /// Build a world from a validated configuration and a current field.
    pub fn new(config: FisheryConfig, currents: Box<dyn Currents>) -> Result<Self, FisheryError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let species = config.species_table();
        let grid = NauticalMap::ocean(config.grid_width, config.grid_height)?;
        let initial: Vec<f64> = config
            .species
            .iter()
            .map(|s| s.initial_tile_biomass_kg)
            .collect();
        let capacity: Vec<f64> = config.species.iter().map(|s| s.tile_capacity_kg).collect();
        let biomass = BiomassGrid::uniform(config.grid_width, config.grid_height, &initial, &capacity)?;
        let fads = FadMap::new(config.grid_width, config.grid_height, currents)?;
        let set_duration = Normal::new(config.avg_set_duration_hours, config.std_set_duration_hours)
            .map_err(|_| {
                FisheryError::InvalidConfig("set duration parameters must describe a distribution")
            })?;
        let valuer = Box::new(config.prices());
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            day: Day::zero(),
            rng,
            species,
            grid,
            biomass,
            fads,
            fishers: SlotMap::with_key(),
            fisher_order: Vec::new(),
            valuer,
            set_duration,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Put a vessel in the water at its home port.
    pub fn spawn_fisher(&mut self, spec: FisherSpec) -> Result<FisherId, FisheryError> {
        if !self.grid.is_water(spec.port) {
            return Err(FisheryError::InvalidConfig("port tile must be navigable water"));
        }
        let regulation = self.config.build_regulation(spec.closure);
        let rules = self.config.build_rule_set();
        let hold = Hold::new(self.config.hold_capacity_kg, self.species.len())?;
        let template = self.config.fad_template.clone();
        let stock = self.config.initial_fad_stock;
        let FisherSpec {
            port,
            cheater,
            policy,
            deployment_values,
            ..
        } = spec;
        let id = self.fishers.insert_with_key(|id| Fisher {
            location: port,
            port,
            at_sea: false,
            hours_left: 0.0,
            cheater,
            hold,
            regulation,
            deployment_values,
            manager: FadManager::new(id, stock, template, rules),
            policy,
        });
        self.fisher_order.push(id);
        Ok(id)
    }

    #[must_use]
    pub const fn config(&self) -> &FisheryConfig {
        &self.config
    }

    #[must_use]
    pub const fn day(&self) -> Day {
        self.day
    }

    #[must_use]
    pub const fn species(&self) -> &SpeciesTable {
        &self.species
    }

    #[must_use]
    pub const fn grid(&self) -> &NauticalMap {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut NauticalMap {
        &mut self.grid
    }

    #[must_use]
    pub const fn biomass(&self) -> &BiomassGrid {
        &self.biomass
    }

    pub fn biomass_mut(&mut self) -> &mut BiomassGrid {
        &mut self.biomass
    }

    #[must_use]
    pub const fn fads(&self) -> &FadMap {
        &self.fads
    }

    pub fn fisher(&self, id: FisherId) -> Option<&Fisher> {
        self.fishers.get(id)
    }

    pub fn fisher_mut(&mut self, id: FisherId) -> Option<&mut Fisher> {
        self.fishers.get_mut(id)
    }

    #[must_use]
    pub fn fisher_ids(&self) -> &[FisherId] {
        &self.fisher_order
    }

    /// Replace the catch valuer policies consult.
    pub fn set_valuer(&mut self, valuer: Box<dyn CatchValuer>) {
        self.valuer = valuer;
    }

    pub fn history(&self) -> impl Iterator<Item = &DaySummary> {
        self.history.iter()
    }

    #[must_use]
    pub fn latest_summary(&self) -> Option<&DaySummary> {
        self.history.back()
    }

    /// Process one day: drift and losses, yearly rule resets, then every
    /// vessel's day in spawn order, then the history summary.
    pub fn step(&mut self) -> Result<DayEvents, FisheryError> {
        let day = self.day;
        let fads_lost = self.stage_drift_and_losses(day)?;
        self.stage_yearly_reset(day);
        let (tally, landings_kg) = self.stage_fisher_days(day)?;
        let events = DayEvents {
            day,
            deployments: tally.deployments,
            fad_sets: tally.fad_sets,
            unassociated_sets: tally.unassociated_sets,
            fads_lost,
            landings_kg,
        };
        self.stage_summary(&events);
        self.day = self.day.next();
        Ok(events)
    }

    /// Drift everything afloat, then route each loss to its owner.
    fn stage_drift_and_losses(&mut self, day: Day) -> Result<u32, FisheryError> {
        let losses = self.fads.step(&self.grid, &mut self.biomass, day);
        let count = losses.len() as u32;
        for loss in losses {
            let fisher = self
                .fishers
                .get_mut(loss.owner)
                .ok_or(FisheryError::UnknownFisher)?;
            fisher.manager.lose_fad(loss.key, &loss.biomass)?;
        }
        Ok(count)
    }

    /// At each year boundary the counting rules reset before anyone acts.
    fn stage_yearly_reset(&mut self, day: Day) {
        if day.of_year(self.config.days_per_year) == 1 {
            for fisher in self.fishers.values_mut() {
                fisher.manager.rules_mut().reset_yearly();
            }
        }
    }

    fn stage_fisher_days(&mut self, day: Day) -> Result<(ActionTally, f64), FisheryError> {
        let mut tally = ActionTally::default();
        let mut landings_kg = 0.0;
        for i in 0..self.fisher_order.len() {
            let id = self.fisher_order[i];
            {
                let fisher = self.fishers.get_mut(id).ok_or(FisheryError::UnknownFisher)?;
                if !fisher.at_sea {
                    fisher.at_sea = true;
                    fisher.hours_left = self.config.trip_hours;
                    fisher.location = fisher.port;
                }
            }
            self.move_fisher(id)?;
            if let Some(action) = self.act_fisher(id, day)? {
                match action.kind {
                    ActionKind::Deploy => tally.deployments += 1,
                    ActionKind::OwnFadSet | ActionKind::OtherFadSet => tally.fad_sets += 1,
                    ActionKind::UnassociatedSet => tally.unassociated_sets += 1,
                }
            }
            let full_fraction = self.config.hold_full_fraction;
            let fisher = self.fishers.get_mut(id).ok_or(FisheryError::UnknownFisher)?;
            fisher.hours_left -= 24.0;
            let go_home = fisher.hours_left <= 0.0
                || fisher.hold.fullness() >= full_fraction
                || !fisher.manager.rules().has_yearly_limited_action_remaining();
            if go_home {
                fisher.at_sea = false;
                fisher.location = fisher.port;
                fisher.hours_left = 0.0;
                landings_kg += fisher.hold.unload().iter().sum::<f64>();
            }
        }
        Ok((tally, landings_kg))
    }

    /// One random-walk move through navigable water.
    fn move_fisher(&mut self, id: FisherId) -> Result<(), FisheryError> {
        let fisher = self.fishers.get_mut(id).ok_or(FisheryError::UnknownFisher)?;
        let options = self.grid.water_neighbors(fisher.location);
        if !options.is_empty() {
            fisher.location = options[self.rng.random_range(0..options.len())];
        }
        Ok(())
    }

    /// Ask the vessel's policy for an action and carry it out if it fits
    /// the remaining trip hours and survives the feasibility gates.
    fn act_fisher(&mut self, id: FisherId, day: Day) -> Result<Option<Action>, FisheryError> {
        let days_per_year = self.config.days_per_year;
        let deploy_duration = self.config.deploy_duration_hours;
        let min_set_duration = self.config.min_set_duration_hours;
        let fisher = self.fishers.get_mut(id).ok_or(FisheryError::UnknownFisher)?;
        let view = PolicyView {
            actor: id,
            tile: fisher.location,
            day,
            cheater: fisher.cheater,
            days_per_year,
            map: &self.grid,
            fads: &self.fads,
            manager: &fisher.manager,
            general: &fisher.regulation,
            biomass: &self.biomass,
            valuer: self.valuer.as_ref(),
            deployment_values: &fisher.deployment_values,
        };
        let proposed = fisher.policy.propose_action(&view, &mut self.rng);
        let Some(action) = proposed else {
            fisher.policy.record_tick(None);
            return Ok(None);
        };
        let ctx = ActionContext {
            map: &self.grid,
            fads: &self.fads,
            manager: &fisher.manager,
            general: &fisher.regulation,
            days_per_year,
        };
        let permitted = action.can_happen(&ctx, fisher.cheater);
        let duration = if action.kind == ActionKind::Deploy {
            deploy_duration
        } else {
            self.set_duration
                .sample(&mut self.rng)
                .max(min_set_duration)
        };
        if !permitted || duration > fisher.hours_left {
            fisher.policy.record_tick(None);
            return Ok(None);
        }
        let executed = self.execute_action(&action, duration)?;
        let fisher = self.fishers.get_mut(id).ok_or(FisheryError::UnknownFisher)?;
        if executed {
            fisher.policy.record_tick(Some(&action));
            Ok(Some(action))
        } else {
            fisher.policy.record_tick(None);
            Ok(None)
        }
    }

    fn execute_action(&mut self, action: &Action, duration: f64) -> Result<bool, FisheryError> {
        match action.kind {
            ActionKind::Deploy => {
                let fisher = self
                    .fishers
                    .get_mut(action.actor)
                    .ok_or(FisheryError::UnknownFisher)?;
                let deployed = fisher.manager.deploy_fad(
                    &mut self.fads,
                    action.tile,
                    action.day,
                    &mut self.rng,
                )?;
                if deployed.is_none() {
                    return Ok(false);
                }
                fisher.hours_left -= duration;
                fisher.manager.react_to(action);
                Ok(true)
            }
            ActionKind::OwnFadSet | ActionKind::OtherFadSet => {
                let Some(key) = action.target else {
                    return Ok(false);
                };
                let success = self.rng.random_bool(self.config.successful_set_probability);
                let (mut fad, at) = self.fads.remove(key)?;
                let owner = fad.owner();
                let catch = if success {
                    fad.harvest_all()
                } else {
                    // The school escapes back into the tile underneath.
                    let tile = TilePos::from_point(at);
                    if let Some((cell, capacity)) = self.biomass.cell_with_capacity_mut(tile) {
                        fad.release_fish(cell, capacity);
                    }
                    Vec::new()
                };
                self.fishers
                    .get_mut(owner)
                    .ok_or(FisheryError::UnknownFisher)?
                    .manager
                    .consume_fad(key)?;
                let actor = self
                    .fishers
                    .get_mut(action.actor)
                    .ok_or(FisheryError::UnknownFisher)?;
                if !catch.is_empty() {
                    actor.hold.store(&catch);
                }
                actor.hours_left -= duration;
                actor.manager.react_to(action);
                Ok(true)
            }
            ActionKind::UnassociatedSet => {
                let success = self.rng.random_bool(self.config.successful_set_probability);
                if success && !self.config.unassociated_set_samples.is_empty() {
                    let row = self.config.unassociated_set_samples
                        [self.rng.random_range(0..self.config.unassociated_set_samples.len())]
                    .clone();
                    if let Some(cell) = self.biomass.cell_mut(action.tile) {
                        let catch: Vec<f64> = row
                            .iter()
                            .zip(cell.iter_mut())
                            .map(|(want, have)| {
                                let take = want.min(*have);
                                *have -= take;
                                take
                            })
                            .collect();
                        let actor = self
                            .fishers
                            .get_mut(action.actor)
                            .ok_or(FisheryError::UnknownFisher)?;
                        actor.hold.store(&catch);
                    }
                }
                let actor = self
                    .fishers
                    .get_mut(action.actor)
                    .ok_or(FisheryError::UnknownFisher)?;
                actor.hours_left -= duration;
                actor.manager.react_to(action);
                Ok(true)
            }
        }
    }

    fn stage_summary(&mut self, events: &DayEvents) {
        let mut summary = DaySummary {
            day: events.day,
            fishers_at_sea: 0,
            fads_deployed: self.fads.len(),
            fads_in_stock: 0,
            fads_lost: 0,
            fads_consumed: 0,
            fad_biomass_kg: self.fads.total_reservoir(),
            tile_biomass_kg: self.biomass.total_biomass(),
            hold_biomass_kg: 0.0,
        };
        for fisher in self.fishers.values() {
            if fisher.at_sea {
                summary.fishers_at_sea += 1;
            }
            summary.fads_in_stock += u64::from(fisher.manager.stock());
            summary.fads_lost += fisher.manager.lost();
            summary.fads_consumed += fisher.manager.consumed();
            summary.hold_biomass_kg += fisher.hold.total_load();
        }
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }
}
