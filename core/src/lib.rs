//! slotfloor-core — the periodic automation core for a casino floor.
//!
//! Two jobs share one durable SQLite store and one execution pattern
//! (poll/query → evaluate → act → record):
//!
//! - [`monitor::TelemetryMonitor`] polls device metrics on a fixed
//!   interval, persists every reading, and escalates deduplicated
//!   overutilization alerts.
//! - [`reclassifier::TierReclassifier`] recomputes loyalty tiers from
//!   wager totals once per day and keeps an append-only transition
//!   history.
//!
//! External collaborators — the telemetry feed, the tier-consuming
//! API, and the notification channel — sit behind narrow traits
//! ([`telemetry::TelemetrySource`], [`tier_api::TierSink`],
//! [`notifier::Notifier`]); the core never speaks a wire protocol
//! itself.

pub mod config;
pub mod error;
pub mod monitor;
pub mod notifier;
pub mod reclassifier;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod tier;
pub mod tier_api;
pub mod types;
