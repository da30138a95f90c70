//! The telemetry boundary — device metadata, metric readings, and the
//! source that produces them.
//!
//! The core never talks to device firmware or a vendor API directly.
//! Whatever sits on the other side (HTTP gateway, fleet simulator in
//! the runner, scripted fake in tests) implements `TelemetrySource`.

use crate::{
    error::CoreResult,
    types::{MachineId, MachineStatus},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked gaming device. Mutated only by external maintenance
/// events; read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotMachine {
    pub machine_id: MachineId,
    pub location: String,
    pub game_type: String,
    pub max_bet: f64,
    pub last_maintenance_at: Option<DateTime<Utc>>,
}

/// One reading for one machine in one poll cycle. Immutable once
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub machine_id: MachineId,
    pub utilization: f64,
    pub revenue: f64,
    pub spin_count: i64,
    pub status: MachineStatus,
    pub location: String,
    pub collected_at: DateTime<Utc>,
}

/// Produces the current metric snapshot for all tracked machines.
///
/// A fetch may fail for transport reasons (timeout, non-2xx, malformed
/// payload); implementations surface that as `CoreError::TelemetryFetch`.
/// An empty snapshot is a valid result, not an error.
pub trait TelemetrySource: Send {
    fn fetch(&mut self) -> CoreResult<Vec<MetricSample>>;
}
