use std::collections::HashMap;

use anyhow::{Result, bail};
use clap::Parser;
use fadsim_core::{
    ClosureChoice, Currents, FisherMap, FisherSpec, FisheryConfig, FisheryState, Point,
    PolicyRegistry, PropensityPolicy, RandomPolicy, TilePos,
};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "fadsim",
    version,
    about = "Agent-based purse-seine fishery with drifting fish-aggregating devices"
)]
struct Cli {
    /// RNG seed; runs with the same seed replay the same history.
    #[arg(long, env = "FADSIM_SEED", default_value_t = 0xFAD0_CAFE_0123_4567)]
    seed: u64,

    /// Days to simulate.
    #[arg(long, default_value_t = 730)]
    days: u64,

    /// Purse seiners to put in the water.
    #[arg(long, default_value_t = 12)]
    vessels: usize,

    /// Fraction of the fleet that ignores regulations.
    #[arg(long, default_value_t = 0.0)]
    cheaters: f64,

    /// Give every fourth vessel the uniform-random policy instead of the
    /// propensity policy.
    #[arg(long)]
    mixed_policies: bool,

    /// Log every day instead of a digest every 30 days.
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if !(0.0..=1.0).contains(&cli.cheaters) {
        bail!("--cheaters must lie in [0, 1], got {}", cli.cheaters);
    }
    if cli.vessels == 0 {
        bail!("--vessels must be at least 1");
    }
    run(&cli)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = FisheryConfig {
        rng_seed: Some(cli.seed),
        ..FisheryConfig::default()
    };
    let width = config.grid_width;
    let height = config.grid_height;
    let days_per_year = config.days_per_year;
    let mut world = FisheryState::new(config, basin_currents(width, height, days_per_year))?;

    info!(
        seed = cli.seed,
        days = cli.days,
        vessels = cli.vessels,
        "Starting fishery simulation"
    );

    let registry = install_policies();
    spawn_fleet(&mut world, &registry, cli)?;

    let mut landings_kg = 0.0;
    let mut deployments = 0u64;
    let mut fad_sets = 0u64;
    let mut unassociated_sets = 0u64;
    let mut fads_lost = 0u64;
    let mut sea_days: FisherMap<u64> = FisherMap::new();
    for _ in 0..cli.days {
        let events = world.step()?;
        for &id in world.fisher_ids() {
            if world.fisher(id).is_some_and(|fisher| fisher.is_at_sea()) {
                if let Some(days) = sea_days.entry(id) {
                    *days.or_insert(0) += 1;
                }
            }
        }
        landings_kg += events.landings_kg;
        deployments += u64::from(events.deployments);
        fad_sets += u64::from(events.fad_sets);
        unassociated_sets += u64::from(events.unassociated_sets);
        fads_lost += u64::from(events.fads_lost);
        let digest_day = events.day.0 % 30 == 29;
        if cli.verbose || digest_day {
            if let Some(summary) = world.latest_summary() {
                info!(
                    day = summary.day.0,
                    at_sea = summary.fishers_at_sea,
                    fads_afloat = summary.fads_deployed,
                    fad_biomass_kg = summary.fad_biomass_kg,
                    tile_biomass_kg = summary.tile_biomass_kg,
                    landings_kg = events.landings_kg,
                    "Day complete"
                );
            }
        }
    }

    let mut in_stock = 0u64;
    let mut consumed = 0u64;
    for (i, &id) in world.fisher_ids().iter().enumerate() {
        if let Some(fisher) = world.fisher(id) {
            in_stock += u64::from(fisher.manager().stock());
            consumed += fisher.manager().consumed();
            info!(
                vessel = i,
                policy = fisher.policy_kind(),
                days_at_sea = sea_days.get(id).copied().unwrap_or(0),
                fads_in_stock = fisher.manager().stock(),
                fads_lost = fisher.manager().lost(),
                fads_consumed = fisher.manager().consumed(),
                "Vessel ledger"
            );
        }
    }
    info!(
        days = cli.days,
        deployments,
        fad_sets,
        unassociated_sets,
        fads_lost,
        fads_afloat = world.fads().len(),
        fads_in_stock = in_stock,
        fads_consumed = consumed,
        landings_kg,
        "Run complete"
    );
    Ok(())
}

/// The policy roster vessels are drawn from, in the registry's own terms.
fn install_policies() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    registry.register("propensity", || Box::new(PropensityPolicy::default()));
    registry.register("random", || Box::new(RandomPolicy));
    info!(policies = ?registry.names().collect::<Vec<_>>(), "Installed vessel policies");
    registry
}

/// Put the fleet in the water: one shared port, closures split evenly
/// between the two seasonal options, every vessel's behaviour spawned
/// from the registry by name, each with its own perceived
/// deployment-value hotspots.
fn spawn_fleet(world: &mut FisheryState, registry: &PolicyRegistry, cli: &Cli) -> Result<()> {
    let width = world.config().grid_width;
    let height = world.config().grid_height;
    let port = TilePos::new(width - 2, height / 2);
    let mut scenario_rng = SmallRng::seed_from_u64(cli.seed.rotate_left(17));
    for i in 0..cli.vessels {
        let closure = if i % 2 == 0 {
            ClosureChoice::A
        } else {
            ClosureChoice::B
        };
        let policy_name = if cli.mixed_policies && i % 4 == 3 {
            "random"
        } else {
            "propensity"
        };
        let policy = registry
            .spawn(policy_name)
            .ok_or_else(|| anyhow::anyhow!("no vessel policy named {policy_name}"))?;
        let mut spec = FisherSpec::new(port, closure, policy);
        spec.cheater = scenario_rng.random_bool(cli.cheaters);
        spec.deployment_values = deployment_hotspots(&mut scenario_rng, width, height);
        let id = world.spawn_fisher(spec)?;
        let fisher = world.fisher(id).ok_or_else(|| anyhow::anyhow!("vessel vanished"))?;
        info!(
            vessel = i,
            policy = fisher.policy_kind(),
            cheater = fisher.is_cheater(),
            closure = ?closure,
            "Spawned vessel"
        );
    }
    Ok(())
}

/// A handful of random tiles each vessel believes are good deployment
/// grounds. Tiles not listed score zero.
fn deployment_hotspots(rng: &mut SmallRng, width: u32, height: u32) -> HashMap<TilePos, f64> {
    let mut values = HashMap::new();
    for _ in 0..48 {
        let tile = TilePos::new(rng.random_range(0..width), rng.random_range(0..height));
        values.insert(tile, rng.random_range(50.0..2_000.0));
    }
    values
}

/// A slow basin-scale gyre with a seasonal east-west wobble and a steady
/// westward leak, in tiles per day. The leak carries some devices out of
/// the domain so losses actually happen.
fn basin_currents(width: u32, height: u32, days_per_year: u32) -> Box<dyn Currents> {
    let cx = f64::from(width) / 2.0;
    let cy = f64::from(height) / 2.0;
    let year = f64::from(days_per_year);
    Box::new(move |at: Point, step: u64| {
        let swirl = 0.012;
        let wobble = (step as f64 / year * std::f64::consts::TAU).sin() * 0.05;
        at.translated(swirl * (at.y - cy) + wobble - 0.02, -swirl * (at.x - cx))
    })
}
