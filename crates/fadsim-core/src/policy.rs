//! Stochastic action selection: propensity scoring and pluggable policies.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore};

use crate::actions::{Action, ActionContext, ActionFamily, ActionKind};
use crate::biology::{BiomassGrid, CatchValuer};
use crate::fad_manager::FadManager;
use crate::fad_map::FadMap;
use crate::geography::{NauticalMap, TilePos};
use crate::regulation::Regulation;
use crate::{Day, FisherId};

/// Probability that an opportunity of value `value` is taken.
///
/// `(1 - e^(-coefficient * (value + 1))) / (1 + decay * consecutive)`,
/// which lies in `[0, 1)` for non-negative arguments: the exponential
/// saturates toward 1 as value grows, and every consecutive action of the
/// same family damps the result.
#[must_use]
pub fn propensity(coefficient: f64, value: f64, consecutive: u64, decay: f64) -> f64 {
    debug_assert!(coefficient >= 0.0 && value >= 0.0 && decay >= 0.0);
    (1.0 - (-coefficient * (value + 1.0)).exp()) / (1.0 + decay * consecutive as f64)
}

/// Read-only slice of the world a policy consults when proposing.
pub struct PolicyView<'a> {
    pub actor: FisherId,
    pub tile: TilePos,
    pub day: Day,
    pub cheater: bool,
    pub days_per_year: u32,
    pub map: &'a NauticalMap,
    pub fads: &'a FadMap,
    pub manager: &'a FadManager,
    pub general: &'a Regulation,
    pub biomass: &'a BiomassGrid,
    pub valuer: &'a dyn CatchValuer,
    /// Perceived deployment value per tile; tiles absent score zero.
    pub deployment_values: &'a HashMap<TilePos, f64>,
}

impl<'a> PolicyView<'a> {
    #[must_use]
    pub fn action_ctx(&self) -> ActionContext<'a> {
        ActionContext {
            map: self.map,
            fads: self.fads,
            manager: self.manager,
            general: self.general,
            days_per_year: self.days_per_year,
        }
    }
}

/// Decides what a vessel tries to do with its day.
pub trait FishingPolicy: Send + Sync {
    /// Static identifier of the policy implementation.
    fn kind(&self) -> &'static str;

    /// Propose at most one action for the current tick.
    fn propose_action(&mut self, view: &PolicyView<'_>, rng: &mut dyn RngCore) -> Option<Action>;

    /// Told what the tick actually produced, so damping state can advance.
    fn record_tick(&mut self, produced: Option<&Action>);
}

/// Parameters of the propensity-driven policy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PropensityParams {
    pub deploy_coefficient: f64,
    pub unassociated_coefficient: f64,
    pub own_fad_coefficient: f64,
    pub other_fad_coefficient: f64,
    /// Damping applied per consecutive action of the same family.
    pub decay: f64,
}

impl Default for PropensityParams {
    fn default() -> Self {
        Self {
            deploy_coefficient: 0.5,
            unassociated_coefficient: 1e-4,
            own_fad_coefficient: 1e-3,
            other_fad_coefficient: 5e-4,
            decay: 0.1,
        }
    }
}

/// The default vessel behaviour: deployment first, then a try for a
/// free-swimming school, then sets on local devices ranked by ascending
/// reservoir value. The first opportunity to pass both its propensity roll
/// and the feasibility gates wins the day.
#[derive(Debug, Clone)]
pub struct PropensityPolicy {
    params: PropensityParams,
    consecutive: [u64; ActionFamily::COUNT],
}

impl PropensityPolicy {
    #[must_use]
    pub fn new(params: PropensityParams) -> Self {
        Self {
            params,
            consecutive: [0; ActionFamily::COUNT],
        }
    }

    /// Consecutive action-producing ticks recorded for `family`.
    #[must_use]
    pub const fn consecutive_count(&self, family: ActionFamily) -> u64 {
        self.consecutive[family.index()]
    }
}

impl Default for PropensityPolicy {
    fn default() -> Self {
        Self::new(PropensityParams::default())
    }
}

impl FishingPolicy for PropensityPolicy {
    fn kind(&self) -> &'static str {
        "propensity"
    }

    fn propose_action(&mut self, view: &PolicyView<'_>, rng: &mut dyn RngCore) -> Option<Action> {
        let ctx = view.action_ctx();

        let deploy = Action::deploy(view.actor, view.tile, view.day);
        let value = view.deployment_values.get(&view.tile).copied().unwrap_or(0.0);
        let p = propensity(
            self.params.deploy_coefficient,
            value,
            self.consecutive[ActionFamily::Deploy.index()],
            self.params.decay,
        );
        if rng.random_bool(p) && deploy.can_happen(&ctx, view.cheater) {
            return Some(deploy);
        }

        let school = Action::unassociated_set(view.actor, view.tile, view.day);
        let value = view
            .biomass
            .cell(view.tile)
            .map_or(0.0, |cell| view.valuer.value_of(cell));
        let p = propensity(
            self.params.unassociated_coefficient,
            value,
            self.consecutive[ActionFamily::UnassociatedSet.index()],
            self.params.decay,
        );
        if rng.random_bool(p) && school.can_happen(&ctx, view.cheater) {
            return Some(school);
        }

        let mut candidates: Vec<(OrderedFloat<f64>, Action)> = view
            .fads
            .fads_at(view.tile)
            .iter()
            .filter_map(|&key| {
                let fad = view.fads.fad(key)?;
                let own = fad.owner() == view.actor;
                let value = view.valuer.value_of(fad.reservoir());
                Some((
                    OrderedFloat(value),
                    Action::fad_set(view.actor, view.tile, view.day, key, own),
                ))
            })
            .collect();
        candidates.sort_by_key(|(value, _)| *value);
        let count = self.consecutive[ActionFamily::FadSet.index()];
        for (value, action) in candidates {
            let coefficient = if action.kind == ActionKind::OwnFadSet {
                self.params.own_fad_coefficient
            } else {
                self.params.other_fad_coefficient
            };
            let p = propensity(coefficient, value.into_inner(), count, self.params.decay);
            if rng.random_bool(p) && action.can_happen(&ctx, view.cheater) {
                return Some(action);
            }
        }
        None
    }

    fn record_tick(&mut self, produced: Option<&Action>) {
        match produced {
            Some(action) => {
                let idx = action.kind.family().index();
                self.consecutive[idx] = self.consecutive[idx].saturating_add(1);
            }
            None => self.consecutive = [0; ActionFamily::COUNT],
        }
    }
}

/// Uniform pick among whatever is feasible here: a deployment, or a set on
/// one randomly chosen local device.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPolicy;

impl FishingPolicy for RandomPolicy {
    fn kind(&self) -> &'static str {
        "random"
    }

    fn propose_action(&mut self, view: &PolicyView<'_>, rng: &mut dyn RngCore) -> Option<Action> {
        let ctx = view.action_ctx();
        let mut options = Vec::with_capacity(2);
        let deploy = Action::deploy(view.actor, view.tile, view.day);
        if deploy.can_happen(&ctx, view.cheater) {
            options.push(deploy);
        }
        let here = view.fads.fads_at(view.tile);
        if !here.is_empty() {
            let key = here[rng.random_range(0..here.len())];
            if let Some(fad) = view.fads.fad(key) {
                let set =
                    Action::fad_set(view.actor, view.tile, view.day, key, fad.owner() == view.actor);
                if set.can_happen(&ctx, view.cheater) {
                    options.push(set);
                }
            }
        }
        if options.is_empty() {
            None
        } else {
            Some(options[rng.random_range(0..options.len())])
        }
    }

    fn record_tick(&mut self, _produced: Option<&Action>) {}
}

type PolicyBuilder = Box<dyn Fn() -> Box<dyn FishingPolicy> + Send + Sync>;

/// Named policy constructors.
///
/// Scenarios pick vessel behaviour by configuration string; the registry
/// is built once at startup and passed by reference wherever vessels
/// spawn, never held as global state.
#[derive(Default)]
pub struct PolicyRegistry {
    builders: BTreeMap<Cow<'static, str>, PolicyBuilder>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("names", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `name`, displacing any previous holder.
    pub fn register<F>(&mut self, name: impl Into<Cow<'static, str>>, builder: F)
    where
        F: Fn() -> Box<dyn FishingPolicy> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Drops the constructor registered under `name`.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.builders.remove(name).is_some()
    }

    /// Builds a fresh policy from the constructor registered under `name`.
    #[must_use]
    pub fn spawn(&self, name: &str) -> Option<Box<dyn FishingPolicy>> {
        self.builders.get(name).map(|builder| builder())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|name| &**name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biology::FixedPrices;
    use crate::fad::FadTemplate;
    use crate::rules::{ActionRuleSet, SetLimitRule};
    use fadsim_drift::Point;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn propensity_stays_in_range_and_orders_sensibly() {
        for coefficient in [0.0, 1e-4, 0.1] {
            for value in [0.0, 1.0, 500.0, 5000.0] {
                for consecutive in [0, 1, 10] {
                    let p = propensity(coefficient, value, consecutive, 0.1);
                    assert!((0.0..1.0).contains(&p), "p={p}");
                }
            }
        }
        // The exponential underflows for huge inputs; the result still never
        // exceeds 1 and stays safe to feed a Bernoulli draw.
        let saturated = propensity(10.0, 1e6, 0, 0.0);
        assert!(saturated <= 1.0 && saturated > 0.99);
        assert_eq!(propensity(0.0, 1000.0, 0, 0.1), 0.0);
        assert!(propensity(0.01, 100.0, 0, 0.1) > propensity(0.01, 10.0, 0, 0.1));
        assert!(propensity(0.01, 100.0, 0, 0.1) > propensity(0.01, 100.0, 3, 0.1));
        assert_eq!(propensity(0.01, 50.0, 2, 0.0), propensity(0.01, 50.0, 0, 0.0));
    }

    struct Rig {
        map: NauticalMap,
        fads: FadMap,
        manager: FadManager,
        general: Regulation,
        biomass: BiomassGrid,
        valuer: FixedPrices,
        deployment_values: HashMap<TilePos, f64>,
    }

    impl Rig {
        fn new(stock: u32) -> Self {
            Self {
                map: NauticalMap::ocean(8, 8).unwrap(),
                fads: FadMap::new(8, 8, Box::new(|at: Point, _: u64| at)).unwrap(),
                manager: FadManager::new(
                    FisherId::default(),
                    stock,
                    FadTemplate {
                        capacity_kg: vec![500.0],
                        attraction_rate: 1.0,
                    },
                    ActionRuleSet::new(),
                ),
                general: Regulation::OpenAccess,
                biomass: BiomassGrid::uniform(8, 8, &[1000.0], &[2000.0]).unwrap(),
                valuer: FixedPrices::new(vec![1.0]),
                deployment_values: HashMap::new(),
            }
        }

        fn view(&self) -> PolicyView<'_> {
            PolicyView {
                actor: FisherId::default(),
                tile: TilePos::new(3, 3),
                day: Day(10),
                cheater: false,
                days_per_year: 365,
                map: &self.map,
                fads: &self.fads,
                manager: &self.manager,
                general: &self.general,
                biomass: &self.biomass,
                valuer: &self.valuer,
                deployment_values: &self.deployment_values,
            }
        }
    }

    fn certain() -> f64 {
        1e9
    }

    #[test]
    fn deployment_is_considered_first() {
        let mut rig = Rig::new(1);
        rig.deployment_values.insert(TilePos::new(3, 3), 100.0);
        let mut policy = PropensityPolicy::new(PropensityParams {
            deploy_coefficient: certain(),
            unassociated_coefficient: certain(),
            own_fad_coefficient: certain(),
            other_fad_coefficient: certain(),
            decay: 0.0,
        });
        let mut rng = SmallRng::seed_from_u64(0);
        let action = policy.propose_action(&rig.view(), &mut rng).unwrap();
        assert_eq!(action.kind, ActionKind::Deploy);
    }

    #[test]
    fn fad_sets_target_the_least_valuable_local_device() {
        let mut rig = Rig::new(3);
        let mut rng = SmallRng::seed_from_u64(42);
        let tile = TilePos::new(3, 3);
        let rich = rig.manager.deploy_fad(&mut rig.fads, tile, Day(0), &mut rng).unwrap().unwrap();
        let poor = rig.manager.deploy_fad(&mut rig.fads, tile, Day(0), &mut rng).unwrap().unwrap();
        rig.fads.fad_mut(rich).unwrap().aggregate_fish(&mut [400.0]);
        rig.fads.fad_mut(poor).unwrap().aggregate_fish(&mut [50.0]);

        // Deployment and school rolls are off; any fad-set roll passes.
        let mut policy = PropensityPolicy::new(PropensityParams {
            deploy_coefficient: 0.0,
            unassociated_coefficient: 0.0,
            own_fad_coefficient: certain(),
            other_fad_coefficient: certain(),
            decay: 0.0,
        });
        let action = policy.propose_action(&rig.view(), &mut rng).unwrap();
        assert_eq!(action.kind, ActionKind::OwnFadSet);
        assert_eq!(action.target, Some(poor));
    }

    #[test]
    fn forbidden_actions_fall_through_unless_cheating() {
        let mut rig = Rig::new(0);
        let mut rng = SmallRng::seed_from_u64(7);
        let tile = TilePos::new(3, 3);
        rig.manager
            .rules_mut()
            .push(Box::new(SetLimitRule::new(vec![ActionKind::OwnFadSet], 0)));
        // Stock is empty, so give the manager one device already afloat.
        let mut loader = FadManager::new(
            FisherId::default(),
            1,
            FadTemplate {
                capacity_kg: vec![500.0],
                attraction_rate: 1.0,
            },
            ActionRuleSet::new(),
        );
        loader.deploy_fad(&mut rig.fads, tile, Day(0), &mut rng).unwrap().unwrap();

        let mut policy = PropensityPolicy::new(PropensityParams {
            deploy_coefficient: 0.0,
            unassociated_coefficient: 0.0,
            own_fad_coefficient: certain(),
            other_fad_coefficient: certain(),
            decay: 0.0,
        });
        assert!(policy.propose_action(&rig.view(), &mut rng).is_none());

        let mut view = rig.view();
        view.cheater = true;
        let action = policy.propose_action(&view, &mut rng).unwrap();
        assert_eq!(action.kind, ActionKind::OwnFadSet);
    }

    #[test]
    fn record_tick_advances_and_clears_family_counters() {
        let mut policy = PropensityPolicy::default();
        let set = Action::fad_set(
            FisherId::default(),
            TilePos::new(0, 0),
            Day(0),
            crate::FadKey::default(),
            true,
        );
        policy.record_tick(Some(&set));
        policy.record_tick(Some(&set));
        let deploy = Action::deploy(FisherId::default(), TilePos::new(0, 0), Day(0));
        policy.record_tick(Some(&deploy));
        assert_eq!(policy.consecutive_count(ActionFamily::FadSet), 2);
        assert_eq!(policy.consecutive_count(ActionFamily::Deploy), 1);
        assert_eq!(policy.consecutive_count(ActionFamily::UnassociatedSet), 0);

        policy.record_tick(None);
        assert_eq!(policy.consecutive_count(ActionFamily::FadSet), 0);
        assert_eq!(policy.consecutive_count(ActionFamily::Deploy), 0);
    }

    #[test]
    fn random_policy_only_offers_what_is_feasible() {
        let rig = Rig::new(0);
        let mut policy = RandomPolicy;
        let mut rng = SmallRng::seed_from_u64(5);
        assert!(policy.propose_action(&rig.view(), &mut rng).is_none());

        let rig = Rig::new(2);
        for _ in 0..20 {
            let action = policy.propose_action(&rig.view(), &mut rng).unwrap();
            assert_eq!(action.kind, ActionKind::Deploy, "deployment is the only option");
        }
    }

    #[test]
    fn registry_spawns_by_name() {
        let mut registry = PolicyRegistry::new();
        registry.register("propensity", || Box::new(PropensityPolicy::default()));
        registry.register("random", || Box::new(RandomPolicy));

        assert!(registry.contains("propensity"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["propensity", "random"]);
        let spawned = registry.spawn("propensity").unwrap();
        assert_eq!(spawned.kind(), "propensity");
        assert!(registry.spawn("trawler").is_none());

        assert!(registry.unregister("random"));
        assert!(!registry.contains("random"));
        assert!(registry.spawn("random").is_none());
    }
}
