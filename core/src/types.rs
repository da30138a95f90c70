//! Shared primitive types used across the automation core.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for a tracked gaming device.
pub type MachineId = String;

/// A stable, unique identifier for a loyalty-program player.
pub type PlayerId = String;

/// Operational status reported by the telemetry source.
///
/// Anything the feed reports that we do not recognize decodes to
/// `Unknown` rather than failing the whole snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Normal,
    Maintenance,
    Unknown,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Normal => "normal",
            MachineStatus::Maintenance => "maintenance",
            MachineStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "normal" => MachineStatus::Normal,
            "maintenance" => MachineStatus::Maintenance,
            _ => MachineStatus::Unknown,
        }
    }
}
