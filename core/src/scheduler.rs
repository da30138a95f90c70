//! Scheduled job execution — daily time-of-day triggering, overlap
//! protection, and structured run reporting.
//!
//! RULE: At most one instance of a guarded job executes at a time.
//! A trigger that arrives while the previous run is still going is
//! skipped and logged, never queued — a second concurrent pass over
//! the same "stale players" selection could double-process a player
//! mid-update.

use crate::error::CoreResult;
use chrono::{DateTime, Local, LocalResult, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(String),
}

/// Success/failure/duration for one job invocation.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: JobOutcome,
}

/// Wrap one job invocation with timing and outcome capture. The job's
/// value (e.g. a run summary) is handed back alongside the report.
pub fn run_job<T>(name: &str, job: impl FnOnce() -> CoreResult<T>) -> (JobReport, Option<T>) {
    let started_at = Utc::now();
    let timer = Instant::now();
    let (outcome, value) = match job() {
        Ok(value) => (JobOutcome::Success, Some(value)),
        Err(e) => (JobOutcome::Failed(e.to_string()), None),
    };
    let report = JobReport {
        job: name.to_string(),
        started_at,
        duration: timer.elapsed(),
        outcome,
    };
    match &report.outcome {
        JobOutcome::Success => {
            log::info!("job {name} succeeded in {:?}", report.duration)
        }
        JobOutcome::Failed(reason) => {
            log::error!("job {name} failed after {:?}: {reason}", report.duration)
        }
    }
    (report, value)
}

/// Single-instance guard. Acquisition is a compare-exchange; the slot
/// releases on drop, so a panicking job does not wedge the guard for
/// the owning thread's unwinding path.
#[derive(Default)]
pub struct JobGuard {
    running: AtomicBool,
}

pub struct JobSlot<'a> {
    guard: &'a JobGuard,
}

impl Drop for JobSlot<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<JobSlot<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| JobSlot { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the job if no instance is already executing. Returns `None`
    /// for a skipped trigger.
    pub fn run_exclusive<T>(
        &self,
        name: &str,
        job: impl FnOnce() -> CoreResult<T>,
    ) -> Option<(JobReport, Option<T>)> {
        let Some(_slot) = self.try_acquire() else {
            log::warn!("job {name} is already running, skipping this trigger");
            return None;
        };
        Some(run_job(name, job))
    }
}

/// A fixed local time of day, e.g. the nightly 02:00 reclassification.
#[derive(Debug, Clone, Copy)]
pub struct DailySchedule {
    pub hour: u32,
    pub minute: u32,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    /// The next occurrence strictly after `now`, in local time.
    /// A DST gap that swallows the scheduled minute rolls forward to
    /// the next day that has it. Saturates at the end of the calendar
    /// instead of overflowing.
    pub fn next_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        let mut date = now.date_naive();
        loop {
            if let Some(naive) = date.and_hms_opt(self.hour, self.minute, 0) {
                match Local.from_local_datetime(&naive) {
                    LocalResult::Single(candidate) | LocalResult::Ambiguous(candidate, _) => {
                        if candidate > now {
                            return candidate;
                        }
                    }
                    LocalResult::None => {}
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => return DateTime::<Utc>::MAX_UTC.with_timezone(&Local),
            }
        }
    }
}

/// Sleep-and-fire loop for a daily job. The sleep is an `mpsc` receive
/// with timeout, so shutdown interrupts it immediately; a trigger that
/// lands while the previous run is active is skipped by the guard.
/// Drift is tolerated and missed triggers are not caught up.
pub fn run_daily<T>(
    name: &str,
    schedule: DailySchedule,
    guard: &JobGuard,
    shutdown: &Receiver<()>,
    mut job: impl FnMut() -> CoreResult<T>,
) -> CoreResult<()> {
    loop {
        let now = Local::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        log::info!("job {name} next scheduled at {next}");

        match shutdown.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("scheduler for {name} shutting down");
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        guard.run_exclusive(name, || job());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn next_after_is_strictly_in_the_future() {
        let schedule = DailySchedule::new(2, 0);
        let now = Local::now();
        let next = schedule.next_after(now);
        assert!(next > now);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn consecutive_occurrences_are_a_day_apart() {
        let schedule = DailySchedule::new(2, 0);
        let first = schedule.next_after(Local::now());
        let second = schedule.next_after(first);
        let gap = second - first;
        // 23-25h window tolerates DST transitions.
        assert!(gap >= chrono::Duration::hours(23) && gap <= chrono::Duration::hours(25));
    }

    #[test]
    fn guard_skips_overlapping_trigger() {
        let guard = JobGuard::new();
        let slot = guard.try_acquire().unwrap();
        assert!(guard.is_running());
        assert!(guard.run_exclusive("nightly", || Ok::<_, crate::error::CoreError>(())).is_none());
        drop(slot);
        assert!(!guard.is_running());
        assert!(guard.run_exclusive("nightly", || Ok::<_, crate::error::CoreError>(())).is_some());
    }

    #[test]
    fn next_after_handles_far_future_dates() {
        let schedule = DailySchedule::new(2, 0);
        let now = Utc
            .with_ymd_and_hms(262_100, 6, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local);
        let next = schedule.next_after(now);
        assert!(next > now);
    }

    #[test]
    fn report_captures_failure_reason() {
        let (report, value) = run_job("doomed", || {
            Err::<(), _>(crate::error::CoreError::Config {
                reason: "broken".into(),
            })
        });
        assert!(value.is_none());
        match report.outcome {
            JobOutcome::Failed(reason) => assert!(reason.contains("broken")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
