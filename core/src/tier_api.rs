//! The tier-consuming API boundary.
//!
//! The remote side is not assumed idempotent, so the distinction
//! between "rejected" and "ambiguous" matters: a rejected push can be
//! retried on the next scheduled run, but an ambiguous one (timeout
//! after the remote may have applied it) must never be blindly
//! re-sent, and must never be followed by a local commit.

use crate::{tier::Tier, types::PlayerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    /// The remote definitively did not apply the update.
    #[error("push rejected: {reason}")]
    Rejected { reason: String },

    /// The call timed out or the response was lost; the remote may or
    /// may not have applied the update.
    #[error("push outcome unknown: {reason}")]
    Ambiguous { reason: String },
}

pub trait TierSink: Send {
    fn push_tier(&self, player_id: &PlayerId, tier: Tier) -> Result<(), PushError>;
}

/// Ships with the core: accepts every push and records it in the log.
/// The runner uses this until a real downstream API is wired in.
pub struct LogTierSink;

impl TierSink for LogTierSink {
    fn push_tier(&self, player_id: &PlayerId, tier: Tier) -> Result<(), PushError> {
        log::info!("tier push player={player_id} tier={tier}");
        Ok(())
    }
}
