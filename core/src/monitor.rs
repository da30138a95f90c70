//! Telemetry Monitor — polls device metrics, detects sustained
//! overutilization, and escalates alerts.
//!
//! Cycle shape: fetch snapshot → persist every sample → evaluate →
//! open/resolve alerts → sleep until the next tick. The loop never
//! terminates on a single fetch or store failure; the interval is
//! wall-clock based and missed ticks are not caught up.

use crate::{
    config::MonitorConfig,
    error::CoreResult,
    notifier::Notifier,
    store::{AlertOpenOutcome, FloorStore},
    telemetry::{MetricSample, TelemetrySource},
    types::{MachineId, MachineStatus},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// An escalated overutilization condition. `resolved_at == None`
/// means the alert is open and holds the dedup window shut.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    pub machine_id: MachineId,
    pub utilization: f64,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// What one poll cycle did, for logging and observability.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleReport {
    pub fetch_failed: bool,
    pub samples: usize,
    pub criticals: usize,
    pub alerts_opened: usize,
    pub alerts_resolved: usize,
    pub notifications_sent: usize,
}

pub struct TelemetryMonitor {
    store: FloorStore,
    source: Box<dyn TelemetrySource>,
    notifier: Box<dyn Notifier>,
    config: MonitorConfig,
}

impl TelemetryMonitor {
    pub fn new(
        store: FloorStore,
        source: Box<dyn TelemetrySource>,
        notifier: Box<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
        }
    }

    /// A machine is critical iff utilization is strictly above the
    /// threshold and it is not under maintenance. 85.0 is not critical
    /// at the default threshold; 85.01 is.
    fn is_critical(&self, sample: &MetricSample) -> bool {
        sample.utilization > self.config.utilization_threshold
            && sample.status != MachineStatus::Maintenance
    }

    /// Run one poll cycle against the clock value `now`.
    ///
    /// A fetch failure is absorbed here (logged, reported, cycle
    /// skipped). A store failure propagates as `Err`; the outer loop
    /// logs it and retries on the next cycle.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CoreResult<CycleReport> {
        let mut report = CycleReport::default();

        let samples = match self.fetch_with_retry() {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("telemetry fetch failed, skipping cycle: {e}");
                report.fetch_failed = true;
                return Ok(report);
            }
        };

        // Persist unconditionally, below-threshold readings included —
        // external reporting consumes the full series.
        for sample in &samples {
            self.store.append_metric_sample(sample)?;
        }
        report.samples = samples.len();

        for sample in &samples {
            if self.is_critical(sample) {
                report.criticals += 1;
                self.escalate(sample, now, &mut report)?;
            } else if self.store.resolve_open_alert(&sample.machine_id, now)? {
                // Covers both recovery and entering maintenance; neither
                // sends a notification.
                report.alerts_resolved += 1;
                log::info!(
                    "alert resolved machine={} utilization={:.1}% status={}",
                    sample.machine_id,
                    sample.utilization,
                    sample.status.as_str()
                );
            }
        }

        Ok(report)
    }

    fn escalate(
        &mut self,
        sample: &MetricSample,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> CoreResult<()> {
        match self
            .store
            .open_alert(&sample.machine_id, sample.utilization, &sample.location, now)?
        {
            AlertOpenOutcome::Opened(alert) => {
                report.alerts_opened += 1;
                self.dispatch(&alert, now, report)?;
            }
            AlertOpenOutcome::AlreadyOpen => {
                // Dedup: repeated critical polls stay silent, unless a
                // re-notification window is configured and has elapsed.
                let Some(window_secs) = self.config.renotify_after_secs else {
                    return Ok(());
                };
                if let Some(open) = self.store.open_alert_for(&sample.machine_id)? {
                    let last = open.notified_at.unwrap_or(open.created_at);
                    if now - last >= ChronoDuration::seconds(window_secs as i64) {
                        self.dispatch(&open, now, report)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Hand the alert to the notifier exactly once. A send failure is
    /// logged and not retried; notified_at is stamped either way so a
    /// delivery problem cannot turn into an alert storm.
    fn dispatch(
        &self,
        alert: &AlertEvent,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> CoreResult<()> {
        match self.notifier.notify(alert) {
            Ok(()) => report.notifications_sent += 1,
            Err(e) => log::warn!(
                "notification failed for alert {} (machine {}): {e}",
                alert.alert_id,
                alert.machine_id
            ),
        }
        self.store.mark_alert_notified(&alert.alert_id, now)
    }

    fn fetch_with_retry(&mut self) -> CoreResult<Vec<MetricSample>> {
        match self.source.fetch() {
            Ok(samples) => Ok(samples),
            Err(first) => {
                let Some(backoff_ms) = self.config.fetch_retry_backoff_ms else {
                    return Err(first);
                };
                // The fetch is an idempotent read; one retry is safe.
                log::debug!("fetch failed ({first}), retrying after {backoff_ms}ms");
                std::thread::sleep(Duration::from_millis(backoff_ms));
                self.source.fetch()
            }
        }
    }

    /// Run cycles until a shutdown signal arrives (or the sender is
    /// dropped). Suspension happens only at this sleep boundary and
    /// inside the blocking fetch, so shutdown is cooperative and never
    /// interrupts a half-written cycle.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> CoreResult<()> {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        loop {
            match self.run_cycle(Utc::now()) {
                Ok(report) => log::info!(
                    "cycle complete samples={} criticals={} opened={} resolved={} notified={}{}",
                    report.samples,
                    report.criticals,
                    report.alerts_opened,
                    report.alerts_resolved,
                    report.notifications_sent,
                    if report.fetch_failed { " (fetch failed)" } else { "" }
                ),
                // Store unavailability: fatal for this cycle only.
                Err(e) => log::error!("cycle failed, will retry next interval: {e}"),
            }

            match shutdown.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::info!("telemetry monitor shutting down");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Direct store access for the runner's summaries.
    pub fn store(&self) -> &FloorStore {
        &self.store
    }
}
