//! Per-vessel device ownership: stock, deployment, loss accounting, and
//! the observer lists that let monitors and rules watch a vessel act.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use fadsim_drift::Point;
use rand::Rng;
use rand::rngs::SmallRng;
use rayon::prelude::*;

use crate::actions::{Action, ActionKind};
use crate::biology::BiomassGrid;
use crate::fad::FadTemplate;
use crate::fad_map::FadMap;
use crate::geography::TilePos;
use crate::rules::ActionRuleSet;
use crate::{Day, FadKey, FisherId, FisheryError};

/// Observer told about matching executed actions, in execution order.
pub trait ActionObserver: Send {
    fn on_action(&mut self, action: &Action);
}

impl<F: FnMut(&Action) + Send> ActionObserver for F {
    fn on_action(&mut self, action: &Action) {
        self(action);
    }
}

/// Observer told when one of the vessel's devices goes down, with the
/// reservoir that went down with it.
pub trait BiomassLostObserver: Send {
    fn on_biomass_lost(&mut self, key: FadKey, biomass: &[f64]);
}

impl<F: FnMut(FadKey, &[f64]) + Send> BiomassLostObserver for F {
    fn on_biomass_lost(&mut self, key: FadKey, biomass: &[f64]) {
        self(key, biomass);
    }
}

/// A vessel's side of the device lifecycle.
///
/// Every device the vessel will ever own is in exactly one of four places:
/// the on-board stock, the deployed list, the lost tally, or the consumed
/// tally. The sum of the four never changes.
pub struct FadManager {
    fisher: FisherId,
    stock: u32,
    template: FadTemplate,
    deployed: Vec<FadKey>,
    rules: ActionRuleSet,
    lost: u64,
    consumed: u64,
    deployment_observers: Vec<Box<dyn ActionObserver>>,
    any_set_observers: Vec<Box<dyn ActionObserver>>,
    fad_set_observers: Vec<Box<dyn ActionObserver>>,
    unassociated_set_observers: Vec<Box<dyn ActionObserver>>,
    biomass_lost_observers: Vec<Box<dyn BiomassLostObserver>>,
}

impl fmt::Debug for FadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FadManager")
            .field("fisher", &self.fisher)
            .field("stock", &self.stock)
            .field("deployed", &self.deployed.len())
            .field("lost", &self.lost)
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

impl FadManager {
    #[must_use]
    pub fn new(fisher: FisherId, stock: u32, template: FadTemplate, rules: ActionRuleSet) -> Self {
        Self {
            fisher,
            stock,
            template,
            deployed: Vec::new(),
            rules,
            lost: 0,
            consumed: 0,
            deployment_observers: Vec::new(),
            any_set_observers: Vec::new(),
            fad_set_observers: Vec::new(),
            unassociated_set_observers: Vec::new(),
            biomass_lost_observers: Vec::new(),
        }
    }

    #[must_use]
    pub const fn fisher(&self) -> FisherId {
        self.fisher
    }

    #[must_use]
    pub const fn stock(&self) -> u32 {
        self.stock
    }

    #[must_use]
    pub fn deployed(&self) -> &[FadKey] {
        &self.deployed
    }

    #[must_use]
    pub fn deployed_count(&self) -> usize {
        self.deployed.len()
    }

    #[must_use]
    pub const fn lost(&self) -> u64 {
        self.lost
    }

    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Deployed + stocked + lost + consumed. Constant over a vessel's life.
    #[must_use]
    pub fn lifetime_device_count(&self) -> u64 {
        self.deployed.len() as u64 + u64::from(self.stock) + self.lost + self.consumed
    }

    #[must_use]
    pub const fn can_deploy(&self) -> bool {
        self.stock > 0
    }

    #[must_use]
    pub const fn rules(&self) -> &ActionRuleSet {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut ActionRuleSet {
        &mut self.rules
    }

    /// Drop a fresh device somewhere on `tile`, drawing on the stock.
    /// Returns `None`, changing nothing, when the stock is empty.
    pub fn deploy_fad(
        &mut self,
        fads: &mut FadMap,
        tile: TilePos,
        day: Day,
        rng: &mut SmallRng,
    ) -> Result<Option<FadKey>, FisheryError> {
        if self.stock == 0 {
            return Ok(None);
        }
        let at = Point::new(
            f64::from(tile.x) + rng.random::<f64>(),
            f64::from(tile.y) + rng.random::<f64>(),
        );
        let key = fads.insert(self.template.spawn(self.fisher, day), at)?;
        self.stock -= 1;
        self.deployed.push(key);
        Ok(Some(key))
    }

    /// Retrieve one of this vessel's deployed devices, returning its
    /// reservoir to the tile it floated over and the device to the stock.
    pub fn pick_up_fad(
        &mut self,
        fads: &mut FadMap,
        biology: &mut BiomassGrid,
        key: FadKey,
    ) -> Result<(), FisheryError> {
        let slot = self.deployed_slot(key)?;
        let (mut fad, at) = fads.remove(key)?;
        let tile = TilePos::from_point(at);
        if let Some((cell, capacity)) = biology.cell_with_capacity_mut(tile) {
            fad.release_fish(cell, capacity);
        }
        self.deployed.remove(slot);
        self.stock += 1;
        Ok(())
    }

    /// Account for a device the sea took. The stock is not refunded; the
    /// reservoir aboard is reported to the biomass-lost observers.
    pub fn lose_fad(&mut self, key: FadKey, biomass: &[f64]) -> Result<(), FisheryError> {
        let slot = self.deployed_slot(key)?;
        self.deployed.remove(slot);
        self.lost += 1;
        for observer in &mut self.biomass_lost_observers {
            observer.on_biomass_lost(key, biomass);
        }
        Ok(())
    }

    /// Account for a device destroyed by a set made on it.
    pub fn consume_fad(&mut self, key: FadKey) -> Result<(), FisheryError> {
        let slot = self.deployed_slot(key)?;
        self.deployed.remove(slot);
        self.consumed += 1;
        Ok(())
    }

    fn deployed_slot(&self, key: FadKey) -> Result<usize, FisheryError> {
        self.deployed
            .iter()
            .position(|k| *k == key)
            .ok_or(FisheryError::FadNotDeployed)
    }

    /// Tell the rule set and then every matching observer list about an
    /// executed action. Rules always hear it first, so counting rules are
    /// current before any other observer runs; lists fire in registration
    /// order, the any-set list ahead of the kind-specific one.
    pub fn react_to(&mut self, action: &Action) {
        self.rules.observe(action);
        if action.kind == ActionKind::Deploy {
            Self::notify(&mut self.deployment_observers, action);
        } else {
            Self::notify(&mut self.any_set_observers, action);
            if action.kind.is_fad_set() {
                Self::notify(&mut self.fad_set_observers, action);
            } else {
                Self::notify(&mut self.unassociated_set_observers, action);
            }
        }
    }

    fn notify(observers: &mut [Box<dyn ActionObserver>], action: &Action) {
        for observer in observers {
            observer.on_action(action);
        }
    }

    pub fn observe_deployments(&mut self, observer: Box<dyn ActionObserver>) {
        self.deployment_observers.push(observer);
    }

    pub fn observe_all_sets(&mut self, observer: Box<dyn ActionObserver>) {
        self.any_set_observers.push(observer);
    }

    pub fn observe_fad_sets(&mut self, observer: Box<dyn ActionObserver>) {
        self.fad_set_observers.push(observer);
    }

    pub fn observe_unassociated_sets(&mut self, observer: Box<dyn ActionObserver>) {
        self.unassociated_set_observers.push(observer);
    }

    pub fn observe_biomass_lost(&mut self, observer: Box<dyn BiomassLostObserver>) {
        self.biomass_lost_observers.push(observer);
    }

    /// Project this vessel's deployed devices to day `at` and group the
    /// survivors by destination tile. Within a tile, devices keep
    /// deployment order; tiles come back in row-major order.
    #[must_use]
    pub fn deployed_fads_by_tile_at(
        &self,
        fads: &FadMap,
        now: Day,
        at: Day,
    ) -> BTreeMap<TilePos, Vec<FadKey>> {
        let projected: Vec<(TilePos, FadKey)> = self
            .deployed
            .par_iter()
            .filter_map(|&key| fads.project_tile(key, now, at).map(|tile| (tile, key)))
            .collect();
        let mut grouped: BTreeMap<TilePos, Vec<FadKey>> = BTreeMap::new();
        for (tile, key) in projected {
            grouped.entry(tile).or_default().push(key);
        }
        grouped
    }

    /// Every tile any of this vessel's devices is projected to touch on the
    /// days of `[from, to]`.
    #[must_use]
    pub fn fad_locations_in_range(
        &self,
        fads: &FadMap,
        now: Day,
        from: Day,
        to: Day,
    ) -> BTreeSet<TilePos> {
        self.deployed
            .par_iter()
            .flat_map_iter(|&key| {
                fads.trajectory_tiles(key, now, from, to)
                    .into_iter()
                    .map(|(_, tile)| tile)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geography::NauticalMap;
    use crate::rules::SetLimitRule;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};

    fn template() -> FadTemplate {
        FadTemplate {
            capacity_kg: vec![500.0],
            attraction_rate: 0.05,
        }
    }

    fn still() -> FadMap {
        FadMap::new(10, 10, Box::new(|at: Point, _: u64| at)).unwrap()
    }

    fn manager(stock: u32) -> FadManager {
        FadManager::new(FisherId::default(), stock, template(), ActionRuleSet::new())
    }

    #[test]
    fn deploy_draws_on_stock_and_lands_inside_the_tile() {
        let mut fads = still();
        let mut mgr = manager(2);
        let mut rng = SmallRng::seed_from_u64(11);
        let tile = TilePos::new(4, 7);

        let key = mgr.deploy_fad(&mut fads, tile, Day(3), &mut rng).unwrap().unwrap();
        assert_eq!(mgr.stock(), 1);
        assert_eq!(mgr.deployed(), &[key]);
        assert_eq!(fads.fads_at(tile), &[key]);
        let at = fads.position(key).unwrap();
        assert!(at.x >= 4.0 && at.x < 5.0);
        assert!(at.y >= 7.0 && at.y < 8.0);
        assert_eq!(fads.fad(key).map(|f| f.deployed_on()), Some(Day(3)));
    }

    #[test]
    fn the_last_device_deploys_once_and_only_once() {
        let mut fads = still();
        let mut mgr = manager(1);
        let mut rng = SmallRng::seed_from_u64(8);
        let tile = TilePos::new(5, 5);
        let first = mgr.deploy_fad(&mut fads, tile, Day(0), &mut rng).unwrap();
        assert!(first.is_some());
        assert_eq!(mgr.stock(), 0);
        assert_eq!(mgr.deployed_count(), 1);

        let second = mgr.deploy_fad(&mut fads, tile, Day(0), &mut rng).unwrap();
        assert!(second.is_none());
        assert_eq!(mgr.stock(), 0);
        assert_eq!(mgr.deployed_count(), 1);
        assert_eq!(fads.len(), 1);
    }

    #[test]
    fn deploying_from_an_empty_stock_is_a_quiet_no() {
        let mut fads = still();
        let mut mgr = manager(0);
        let mut rng = SmallRng::seed_from_u64(1);
        let out = mgr.deploy_fad(&mut fads, TilePos::new(1, 1), Day(0), &mut rng).unwrap();
        assert!(out.is_none());
        assert!(fads.is_empty());
        assert_eq!(mgr.lifetime_device_count(), 0);
    }

    #[test]
    fn pick_up_restocks_and_releases_the_reservoir() {
        let map = NauticalMap::ocean(10, 10).unwrap();
        let mut biology = BiomassGrid::uniform(10, 10, &[1000.0], &[2000.0]).unwrap();
        let mut fads = still();
        let mut mgr = manager(1);
        let mut rng = SmallRng::seed_from_u64(5);
        let tile = TilePos::new(2, 2);
        let key = mgr.deploy_fad(&mut fads, tile, Day(0), &mut rng).unwrap().unwrap();
        fads.step(&map, &mut biology, Day(0));
        assert_eq!(biology.cell(tile), Some(&[950.0][..]));

        mgr.pick_up_fad(&mut fads, &mut biology, key).unwrap();
        assert_eq!(mgr.stock(), 1);
        assert!(mgr.deployed().is_empty());
        assert!(fads.is_empty());
        assert_eq!(biology.cell(tile), Some(&[1000.0][..]), "reservoir came back");
        assert!(matches!(
            mgr.pick_up_fad(&mut fads, &mut biology, key),
            Err(FisheryError::FadNotDeployed)
        ));
    }

    #[test]
    fn loss_and_consumption_move_devices_to_their_tallies() {
        let mut fads = still();
        let mut mgr = manager(3);
        let mut rng = SmallRng::seed_from_u64(9);
        let a = mgr.deploy_fad(&mut fads, TilePos::new(1, 1), Day(0), &mut rng).unwrap().unwrap();
        let b = mgr.deploy_fad(&mut fads, TilePos::new(2, 2), Day(0), &mut rng).unwrap().unwrap();
        assert_eq!(mgr.lifetime_device_count(), 3);

        mgr.lose_fad(a, &[12.5]).unwrap();
        assert_eq!(mgr.lost(), 1);
        assert_eq!(mgr.stock(), 1, "losses are not refunded");
        mgr.consume_fad(b).unwrap();
        assert_eq!(mgr.consumed(), 1);
        assert_eq!(mgr.deployed_count(), 0);
        assert_eq!(mgr.lifetime_device_count(), 3);
        assert!(matches!(mgr.lose_fad(a, &[0.0]), Err(FisheryError::FadNotDeployed)));
    }

    #[test]
    fn react_to_hits_rules_before_observers_and_lists_in_order() {
        let mut mgr = manager(1);
        mgr.rules_mut()
            .push(Box::new(SetLimitRule::new(vec![ActionKind::OwnFadSet], 5)));
        let log = Arc::new(Mutex::new(Vec::new()));
        for (label, register) in [
            ("any-1", FadManager::observe_all_sets as fn(&mut FadManager, Box<dyn ActionObserver>)),
            ("any-2", FadManager::observe_all_sets),
            ("fad", FadManager::observe_fad_sets),
            ("unassociated", FadManager::observe_unassociated_sets),
            ("deploy", FadManager::observe_deployments),
        ] {
            let log = Arc::clone(&log);
            register(
                &mut mgr,
                Box::new(move |_: &Action| log.lock().unwrap().push(label)),
            );
        }

        let own = Action::fad_set(FisherId::default(), TilePos::new(0, 0), Day(1), FadKey::default(), true);
        mgr.react_to(&own);
        assert_eq!(mgr.rules().remaining(ActionKind::OwnFadSet), Some(4));
        assert_eq!(*log.lock().unwrap(), vec!["any-1", "any-2", "fad"]);

        log.lock().unwrap().clear();
        mgr.react_to(&Action::unassociated_set(FisherId::default(), TilePos::new(0, 0), Day(1)));
        assert_eq!(*log.lock().unwrap(), vec!["any-1", "any-2", "unassociated"]);

        log.lock().unwrap().clear();
        mgr.react_to(&Action::deploy(FisherId::default(), TilePos::new(0, 0), Day(1)));
        assert_eq!(*log.lock().unwrap(), vec!["deploy"]);
    }

    #[test]
    fn biomass_lost_observers_hear_every_loss() {
        let mut fads = still();
        let mut mgr = manager(1);
        let mut rng = SmallRng::seed_from_u64(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        mgr.observe_biomass_lost(Box::new(move |key: FadKey, biomass: &[f64]| {
            sink.lock().unwrap().push((key, biomass.to_vec()));
        }));
        let key = mgr.deploy_fad(&mut fads, TilePos::new(3, 3), Day(0), &mut rng).unwrap().unwrap();
        mgr.lose_fad(key, &[42.0]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(key, vec![42.0])]);
    }

    #[test]
    fn projections_group_by_destination_tile_in_row_major_order() {
        let mut fads = FadMap::new(10, 10, Box::new(|at: Point, _: u64| at.translated(1.0, 0.0))).unwrap();
        let mut mgr = manager(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let a = mgr.deploy_fad(&mut fads, TilePos::new(1, 4), Day(0), &mut rng).unwrap().unwrap();
        let b = mgr.deploy_fad(&mut fads, TilePos::new(1, 4), Day(0), &mut rng).unwrap().unwrap();
        let c = mgr.deploy_fad(&mut fads, TilePos::new(5, 1), Day(0), &mut rng).unwrap().unwrap();

        let grouped = mgr.deployed_fads_by_tile_at(&fads, Day(0), Day(2));
        let entries: Vec<(TilePos, Vec<FadKey>)> = grouped.into_iter().collect();
        assert_eq!(
            entries,
            vec![
                (TilePos::new(7, 1), vec![c]),
                (TilePos::new(3, 4), vec![a, b]),
            ],
            "row-major tiles, deployment order within a tile"
        );

        let visited = mgr.fad_locations_in_range(&fads, Day(0), Day(0), Day(2));
        let visited: Vec<TilePos> = visited.into_iter().collect();
        assert_eq!(
            visited,
            vec![
                TilePos::new(5, 1),
                TilePos::new(6, 1),
                TilePos::new(7, 1),
                TilePos::new(1, 4),
                TilePos::new(2, 4),
                TilePos::new(3, 4),
            ]
        );
    }

    #[test]
    fn projections_drop_tracks_that_leave_the_domain() {
        let mut fads = FadMap::new(6, 6, Box::new(|at: Point, _: u64| at.translated(2.0, 0.0))).unwrap();
        let mut mgr = manager(2);
        let mut rng = SmallRng::seed_from_u64(4);
        mgr.deploy_fad(&mut fads, TilePos::new(4, 2), Day(0), &mut rng).unwrap().unwrap();
        let survivor = mgr.deploy_fad(&mut fads, TilePos::new(0, 3), Day(0), &mut rng).unwrap().unwrap();

        let grouped = mgr.deployed_fads_by_tile_at(&fads, Day(0), Day(1));
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.get(&TilePos::new(2, 3)), Some(&vec![survivor]));
    }
}
