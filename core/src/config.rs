//! Runtime configuration for both periodic jobs.
//!
//! Everything a job needs — endpoints, keys, intervals, thresholds —
//! arrives as an explicit `CoreConfig` value at construction time.
//! There is no global connection or API-key state anywhere in the core.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub monitor: MonitorConfig,
    pub reclassify: ReclassifyConfig,
    pub endpoints: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,
    /// A machine is critical when utilization is strictly above this.
    pub utilization_threshold: f64,
    /// Retry a failed snapshot fetch once after this backoff. The fetch
    /// is an idempotent read, so a single retry is safe.
    pub fetch_retry_backoff_ms: Option<u64>,
    /// If set, a machine that stays critical re-notifies after this many
    /// seconds on the same open alert. Default: notify once per open alert.
    pub renotify_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclassifyConfig {
    /// Local time-of-day for the nightly run.
    pub run_at_hour: u32,
    pub run_at_minute: u32,
    /// A player is due when last evaluated more than this many hours ago.
    pub staleness_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Pre-provisioned key for the telemetry source.
    pub telemetry_api_key: String,
    /// Bound on any single external call.
    pub request_timeout_secs: u64,
}

impl EndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig {
                poll_interval_secs: 300,
                utilization_threshold: 85.0,
                fetch_retry_backoff_ms: Some(2_000),
                renotify_after_secs: None,
            },
            reclassify: ReclassifyConfig {
                run_at_hour: 2,
                run_at_minute: 0,
                staleness_hours: 24,
            },
            endpoints: EndpointConfig {
                telemetry_api_key: String::new(),
                request_timeout_secs: 30,
            },
        }
    }
}

impl CoreConfig {
    /// Load from a JSON file, validating the few values that can render
    /// a job inoperable.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config: CoreConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(CoreError::Config {
                reason: "monitor.poll_interval_secs must be > 0".into(),
            });
        }
        if self.reclassify.run_at_hour > 23 || self.reclassify.run_at_minute > 59 {
            return Err(CoreError::Config {
                reason: format!(
                    "reclassify.run_at {}:{:02} is not a time of day",
                    self.reclassify.run_at_hour, self.reclassify.run_at_minute
                ),
            });
        }
        if self.reclassify.staleness_hours <= 0 {
            return Err(CoreError::Config {
                reason: "reclassify.staleness_hours must be > 0".into(),
            });
        }
        if self.endpoints.request_timeout_secs == 0 {
            return Err(CoreError::Config {
                reason: "endpoints.request_timeout_secs must be > 0".into(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.poll_interval_secs)
    }
}
