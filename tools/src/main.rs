//! floor-runner: headless runner for the Slotfloor automation core.
//!
//! Usage:
//!   floor-runner --job demo --seed 42 --db floor.db
//!   floor-runner --job monitor --cycles 12 --interval 300
//!   floor-runner --job monitor --cycles 0          (run until terminated)
//!   floor-runner --job reclassify --db floor.db
//!   floor-runner --job schedule --db floor.db      (nightly at 02:00 local)
//!
//! `reclassify` exits 0 on success and non-zero on a batch-level fatal
//! error (store unavailability), printing a per-player summary either way.

use anyhow::{bail, Result};
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use slotfloor_core::{
    config::{CoreConfig, EndpointConfig},
    monitor::TelemetryMonitor,
    notifier::LogNotifier,
    reclassifier::{PlayerRecord, TierReclassifier},
    scheduler::{run_daily, run_job, DailySchedule, JobGuard, JobOutcome},
    store::FloorStore,
    telemetry::{MetricSample, SlotMachine, TelemetrySource},
    tier::{tier_for_wager, Tier},
    tier_api::LogTierSink,
    types::MachineStatus,
};
use std::env;
use std::path::Path;
use std::sync::mpsc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let cycles = parse_arg(&args, "--cycles", 6u64);
    let job = args
        .windows(2)
        .find(|w| w[0] == "--job")
        .map(|w| w[1].as_str())
        .unwrap_or("demo");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config_path = args.windows(2).find(|w| w[0] == "--config").map(|w| w[1].clone());

    let mut config = match config_path {
        Some(p) => CoreConfig::load(Path::new(&p))?,
        None => CoreConfig::default(),
    };
    if let Some(interval) = args
        .windows(2)
        .find(|w| w[0] == "--interval")
        .and_then(|w| w[1].parse().ok())
    {
        config.monitor.poll_interval_secs = interval;
    }

    println!("Slotfloor — floor-runner");
    println!("  job:      {job}");
    println!("  seed:     {seed}");
    println!("  db:       {db}");
    println!("  interval: {}s", config.monitor.poll_interval_secs);
    println!();

    // For :memory: use SQLite shared-memory URI so multiple connections
    // (demo mode opens one per job) all share the same in-memory database.
    let db_effective: String = if db == ":memory:" {
        format!("file:floorrun_{}?mode=memory&cache=shared", unix_now())
    } else {
        db.to_string()
    };
    let store = FloorStore::open(&db_effective)?;
    store.migrate()?;

    match job {
        "monitor" => run_monitor(store, &config, seed, cycles),
        "reclassify" => run_reclassify(store, &config),
        "schedule" => run_scheduled(store, &config),
        "demo" => run_demo(store, &config, seed, cycles),
        other => bail!("unknown job '{other}' (expected monitor, reclassify, schedule, or demo)"),
    }
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn run_monitor(store: FloorStore, config: &CoreConfig, seed: u64, cycles: u64) -> Result<()> {
    if store.machine_count()? == 0 {
        seed_fleet(&store)?;
    }
    let fleet = store.all_machines()?;
    let source = SimulatedTelemetry::new(fleet, seed, &config.endpoints);
    let mut monitor = TelemetryMonitor::new(
        store,
        Box::new(source),
        Box::new(LogNotifier),
        config.monitor.clone(),
    );

    if cycles == 0 {
        // Run until the process is terminated. The sender stays alive
        // for the duration of the blocking call, so the loop only ends
        // with the process.
        let (_shutdown_tx, shutdown_rx) = mpsc::channel();
        println!("monitoring every {}s until terminated", config.monitor.poll_interval_secs);
        monitor.run(&shutdown_rx)?;
        return Ok(());
    }

    let interval = config.poll_interval();
    for cycle in 1..=cycles {
        let report = monitor.run_cycle(Utc::now())?;
        println!(
            "cycle {cycle}/{cycles}: samples={} criticals={} opened={} resolved={} notified={}{}",
            report.samples,
            report.criticals,
            report.alerts_opened,
            report.alerts_resolved,
            report.notifications_sent,
            if report.fetch_failed { " (fetch failed)" } else { "" }
        );
        if cycle < cycles {
            std::thread::sleep(interval);
        }
    }

    println!();
    println!("=== MONITOR SUMMARY ===");
    println!("  samples:     {}", monitor.store().sample_count()?);
    println!("  alerts:      {}", monitor.store().alert_count()?);
    println!("  still open:  {}", monitor.store().open_alert_count()?);
    Ok(())
}

fn run_reclassify(store: FloorStore, config: &CoreConfig) -> Result<()> {
    if store.players_due_for_evaluation(Utc::now(), config.reclassify.staleness_hours)?.is_empty()
        && store.tier_history_count()? == 0
    {
        seed_players(&store)?;
    }

    let mut job = TierReclassifier::new(store, Box::new(LogTierSink), config.reclassify.clone());
    let (report, summary) = run_job("tier-reclassify", || job.run(Utc::now()));

    if let Some(summary) = summary {
        println!("=== RECLASSIFICATION SUMMARY ===");
        println!("  selected:  {}", summary.selected);
        println!("  changed:   {}", summary.changed);
        println!("  unchanged: {}", summary.unchanged);
        println!("  failed:    {}", summary.failed);
        println!("  ambiguous: {}", summary.ambiguous);
        println!("  duration:  {:?}", report.duration);
    }

    match report.outcome {
        JobOutcome::Success => Ok(()),
        JobOutcome::Failed(reason) => bail!("reclassification run failed: {reason}"),
    }
}

/// Keep the nightly reclassification on its daily trigger until the
/// process is terminated.
fn run_scheduled(store: FloorStore, config: &CoreConfig) -> Result<()> {
    let schedule = DailySchedule::new(config.reclassify.run_at_hour, config.reclassify.run_at_minute);
    let guard = JobGuard::new();
    let mut job = TierReclassifier::new(store, Box::new(LogTierSink), config.reclassify.clone());

    println!(
        "tier-reclassify scheduled daily at {:02}:{:02} local (terminate to stop)",
        config.reclassify.run_at_hour, config.reclassify.run_at_minute
    );
    let (_shutdown_tx, shutdown_rx) = mpsc::channel();
    run_daily("tier-reclassify", schedule, &guard, &shutdown_rx, || {
        job.run(Utc::now())
    })?;
    Ok(())
}

fn run_demo(store: FloorStore, config: &CoreConfig, seed: u64, cycles: u64) -> Result<()> {
    seed_fleet(&store)?;
    seed_players(&store)?;

    // Monitor and reclassifier each hold their own connection, like
    // separate job processes would.
    let monitor_store = store.reopen()?;
    run_monitor_burst(monitor_store, config, seed, cycles)?;
    run_reclassify(store, config)
}

/// Monitor cycles back-to-back (no interval sleep) for the demo.
fn run_monitor_burst(store: FloorStore, config: &CoreConfig, seed: u64, cycles: u64) -> Result<()> {
    let fleet = store.all_machines()?;
    let source = SimulatedTelemetry::new(fleet, seed, &config.endpoints);
    let mut monitor = TelemetryMonitor::new(
        store,
        Box::new(source),
        Box::new(LogNotifier),
        config.monitor.clone(),
    );
    for _ in 0..cycles {
        monitor.run_cycle(Utc::now())?;
    }
    println!(
        "monitor burst done: {} samples, {} alerts ({} open)",
        monitor.store().sample_count()?,
        monitor.store().alert_count()?,
        monitor.store().open_alert_count()?
    );
    println!();
    Ok(())
}

// ── Seed data ────────────────────────────────────────────────────────

const LOCATIONS: &[&str] = &["Main Floor", "High Limit Room", "North Wing", "Sports Bar"];
const GAMES: &[&str] = &["Lucky Sevens", "Dragon's Hoard", "Gold Rush", "Starfall"];

fn seed_fleet(store: &FloorStore) -> Result<()> {
    for i in 0..8 {
        store.insert_machine(&SlotMachine {
            machine_id: format!("M-{:03}", i + 1),
            location: LOCATIONS[i % LOCATIONS.len()].to_string(),
            game_type: GAMES[i % GAMES.len()].to_string(),
            max_bet: 5.0 * (1 + i % 4) as f64,
            last_maintenance_at: None,
        })?;
    }
    Ok(())
}

fn seed_players(store: &FloorStore) -> Result<()> {
    // Wagers straddle every tier cutoff so a demo run shows changes.
    let wagers = [0.0, 9_500.0, 12_000.0, 45_000.0, 60_000.0, 150_000.0];
    let stale = Utc::now() - chrono::Duration::hours(48);
    for (i, wager) in wagers.iter().enumerate() {
        store.upsert_player(&PlayerRecord {
            player_id: format!("P-{:03}", i + 1),
            name: format!("Player {}", i + 1),
            total_wager: *wager,
            // Seed everyone at Silver so the first run reclassifies.
            tier: Tier::Silver,
            last_evaluated_at: stale,
        })?;
    }
    log::debug!(
        "seeded {} players, top tier would be {}",
        wagers.len(),
        tier_for_wager(wagers[wagers.len() - 1])
    );
    Ok(())
}

// ── Simulated telemetry ──────────────────────────────────────────────

/// A seeded utilization random walk over the tracked fleet, so demo
/// runs are reproducible. One machine per fleet runs persistently hot
/// to exercise the alert path; maintenance windows appear occasionally.
struct SimulatedTelemetry {
    fleet: Vec<SlotMachine>,
    utilization: Vec<f64>,
    rng: Pcg64Mcg,
}

impl SimulatedTelemetry {
    /// Takes the same endpoint settings a real gateway client would;
    /// the simulator only reports them, it has nothing to authenticate
    /// against or time out on.
    fn new(fleet: Vec<SlotMachine>, seed: u64, endpoints: &EndpointConfig) -> Self {
        log::debug!(
            "simulated telemetry over {} machines (api key {}, timeout {:?})",
            fleet.len(),
            if endpoints.telemetry_api_key.is_empty() { "unset" } else { "set" },
            endpoints.request_timeout()
        );
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let utilization = (0..fleet.len())
            .map(|i| {
                if i == 0 {
                    // The designated hot machine starts above threshold.
                    90.0
                } else {
                    rng.gen_range(20.0..70.0)
                }
            })
            .collect();
        Self {
            fleet,
            utilization,
            rng,
        }
    }
}

impl TelemetrySource for SimulatedTelemetry {
    fn fetch(&mut self) -> slotfloor_core::error::CoreResult<Vec<MetricSample>> {
        let now = Utc::now();
        let mut samples = Vec::with_capacity(self.fleet.len());
        for (i, machine) in self.fleet.iter().enumerate() {
            let drift = self.rng.gen_range(-8.0..8.0);
            let floor = if i == 0 { 86.0 } else { 5.0 };
            self.utilization[i] = (self.utilization[i] + drift).clamp(floor, 100.0);

            let status = if self.rng.gen_bool(0.05) {
                MachineStatus::Maintenance
            } else {
                MachineStatus::Normal
            };

            samples.push(MetricSample {
                machine_id: machine.machine_id.clone(),
                utilization: self.utilization[i],
                revenue: self.utilization[i] * self.rng.gen_range(8.0..15.0),
                spin_count: (self.utilization[i] * 12.0) as i64,
                status,
                location: machine.location.clone(),
                collected_at: now,
            });
        }
        Ok(samples)
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
