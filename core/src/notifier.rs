//! The escalation boundary.
//!
//! Delivery (email, pager, chat) is someone else's job; the core hands
//! an alert over exactly once per open alert and moves on. A failed
//! send is logged by the caller, never retried here, and never reopens
//! a resolved alert.

use crate::{error::CoreResult, monitor::AlertEvent};

pub trait Notifier: Send {
    fn notify(&self, alert: &AlertEvent) -> CoreResult<()>;
}

/// Ships with the core: escalation via the process log. Useful as the
/// default sink in the runner and anywhere a real channel is not wired.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: &AlertEvent) -> CoreResult<()> {
        log::warn!(
            "ALERT machine={} utilization={:.1}% location={} alert_id={}",
            alert.machine_id,
            alert.utilization,
            alert.location,
            alert.alert_id
        );
        Ok(())
    }
}
