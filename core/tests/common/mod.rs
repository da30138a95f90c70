//! Shared fixtures: an in-memory store and scripted stand-ins for the
//! three external boundaries (telemetry source, notifier, tier sink).

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use slotfloor_core::{
    config::{MonitorConfig, ReclassifyConfig},
    error::{CoreError, CoreResult},
    monitor::AlertEvent,
    notifier::Notifier,
    reclassifier::PlayerRecord,
    store::FloorStore,
    telemetry::{MetricSample, TelemetrySource},
    tier::Tier,
    tier_api::{PushError, TierSink},
    types::{MachineStatus, PlayerId},
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub fn store() -> FloorStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = FloorStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    store
}

/// A named shared-memory database, for tests that need two connections
/// onto the same state. Names must be unique per test: tests in one
/// binary run in the same process.
pub fn shared_store(name: &str) -> FloorStore {
    let store = FloorStore::open(&format!("file:{name}?mode=memory&cache=shared"))
        .expect("shared-memory store");
    store.migrate().expect("migrate");
    store
}

pub fn monitor_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval_secs: 300,
        utilization_threshold: 85.0,
        fetch_retry_backoff_ms: None,
        renotify_after_secs: None,
    }
}

pub fn reclassify_config() -> ReclassifyConfig {
    ReclassifyConfig {
        run_at_hour: 2,
        run_at_minute: 0,
        staleness_hours: 24,
    }
}

pub fn sample(machine_id: &str, utilization: f64, status: MachineStatus) -> MetricSample {
    MetricSample {
        machine_id: machine_id.to_string(),
        utilization,
        revenue: 420.0,
        spin_count: 800,
        status,
        location: "Main Floor".to_string(),
        collected_at: Utc::now(),
    }
}

pub fn player(id: &str, total_wager: f64, tier: Tier, hours_stale: i64) -> PlayerRecord {
    PlayerRecord {
        player_id: id.to_string(),
        name: format!("Player {id}"),
        total_wager,
        tier,
        last_evaluated_at: Utc::now() - Duration::hours(hours_stale),
    }
}

pub fn fetch_error(reason: &str) -> CoreError {
    CoreError::TelemetryFetch {
        reason: reason.to_string(),
    }
}

// ── Scripted telemetry source ────────────────────────────────────────

/// Replays a fixed sequence of fetch results; once exhausted, every
/// further fetch returns an empty snapshot.
pub struct ScriptedTelemetry {
    batches: VecDeque<CoreResult<Vec<MetricSample>>>,
}

impl ScriptedTelemetry {
    pub fn new(batches: Vec<CoreResult<Vec<MetricSample>>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl TelemetrySource for ScriptedTelemetry {
    fn fetch(&mut self) -> CoreResult<Vec<MetricSample>> {
        self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ── Recording notifier ───────────────────────────────────────────────

pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Returns the notifier and a handle to the machine ids it
    /// delivered for.
    pub fn new(fail: bool) -> (Self, Arc<Mutex<Vec<String>>>) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                delivered: delivered.clone(),
                fail,
            },
            delivered,
        )
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, alert: &AlertEvent) -> CoreResult<()> {
        if self.fail {
            return Err(CoreError::Other(anyhow::anyhow!("smtp down")));
        }
        self.delivered
            .lock()
            .unwrap()
            .push(alert.machine_id.clone());
        Ok(())
    }
}

// ── Scripted tier sink ───────────────────────────────────────────────

#[derive(Clone, Copy)]
pub enum SinkBehavior {
    Accept,
    Reject,
    Ambiguous,
}

pub struct ScriptedTierSink {
    per_player: HashMap<String, SinkBehavior>,
    pushes: Arc<Mutex<Vec<(PlayerId, Tier)>>>,
}

impl ScriptedTierSink {
    /// Accepts every push unless a player is given an override.
    /// Returns the sink and a handle to the pushes it accepted or
    /// attempted.
    pub fn new(
        overrides: &[(&str, SinkBehavior)],
    ) -> (Self, Arc<Mutex<Vec<(PlayerId, Tier)>>>) {
        let pushes = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                per_player: overrides
                    .iter()
                    .map(|(id, b)| (id.to_string(), *b))
                    .collect(),
                pushes: pushes.clone(),
            },
            pushes,
        )
    }
}

impl TierSink for ScriptedTierSink {
    fn push_tier(&self, player_id: &PlayerId, tier: Tier) -> Result<(), PushError> {
        self.pushes.lock().unwrap().push((player_id.clone(), tier));
        match self
            .per_player
            .get(player_id)
            .copied()
            .unwrap_or(SinkBehavior::Accept)
        {
            SinkBehavior::Accept => Ok(()),
            SinkBehavior::Reject => Err(PushError::Rejected {
                reason: "downstream said no".to_string(),
            }),
            SinkBehavior::Ambiguous => Err(PushError::Ambiguous {
                reason: "timed out mid-flight".to_string(),
            }),
        }
    }
}

pub fn at(base: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    base + Duration::minutes(minutes)
}
