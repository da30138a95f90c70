//! Tier Reclassifier — the nightly batch that recomputes loyalty
//! tiers from accumulated wagering activity.
//!
//! Selection is "stale for more than the staleness window", not "all
//! players", so a re-triggered run after a partial failure only picks
//! up what the first run did not finish. Per-player work is isolated:
//! one failed push never aborts the rest of the batch.

use crate::{
    config::ReclassifyConfig,
    error::{CoreError, CoreResult},
    store::FloorStore,
    tier::{tier_for_wager, Tier},
    tier_api::{PushError, TierSink},
    types::PlayerId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub total_wager: f64,
    pub tier: Tier,
    pub last_evaluated_at: DateTime<Utc>,
}

/// One tier transition. Append-only: written exactly once per
/// effective change, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierHistoryRecord {
    pub player_id: PlayerId,
    pub old_tier: Tier,
    pub new_tier: Tier,
    pub changed_at: DateTime<Utc>,
}

/// Per-run counts — the primary observable signal for the nightly batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub selected: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub ambiguous: usize,
}

enum PlayerOutcome {
    Changed(Tier, Tier),
    Unchanged,
    PushRejected(String),
    PushAmbiguous(String),
}

pub struct TierReclassifier {
    store: FloorStore,
    sink: Box<dyn TierSink>,
    config: ReclassifyConfig,
}

impl TierReclassifier {
    pub fn new(store: FloorStore, sink: Box<dyn TierSink>, config: ReclassifyConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Process every player due for evaluation as of `now`.
    ///
    /// Returns `Err` only for batch-level fatal conditions (the store
    /// being unavailable); everything player-scoped is absorbed into
    /// the summary and left eligible for the next run.
    pub fn run(&mut self, now: DateTime<Utc>) -> CoreResult<RunSummary> {
        let due = self
            .store
            .players_due_for_evaluation(now, self.config.staleness_hours)?;

        let mut summary = RunSummary {
            selected: due.len(),
            ..RunSummary::default()
        };

        for player in &due {
            match self.evaluate_player(player, now) {
                Ok(PlayerOutcome::Changed(old, new)) => {
                    summary.changed += 1;
                    log::info!(
                        "tier change player={} {old} -> {new} (wager {:.0})",
                        player.player_id,
                        player.total_wager
                    );
                }
                Ok(PlayerOutcome::Unchanged) => summary.unchanged += 1,
                Ok(PlayerOutcome::PushRejected(reason)) => {
                    summary.failed += 1;
                    log::warn!(
                        "tier push failed player={}, retry next run: {reason}",
                        player.player_id
                    );
                }
                Ok(PlayerOutcome::PushAmbiguous(reason)) => {
                    // The remote may have applied the write. No local
                    // commit, no history row; flag for operators and let
                    // the next scheduled run re-evaluate.
                    summary.ambiguous += 1;
                    log::error!(
                        "tier push UNRESOLVED player={}: {reason}",
                        player.player_id
                    );
                }
                Err(e @ CoreError::Database(_)) => return Err(e),
                Err(e) => {
                    summary.failed += 1;
                    log::error!("player {} skipped: {e}", player.player_id);
                }
            }
        }

        log::info!(
            "reclassification run selected={} changed={} unchanged={} failed={} ambiguous={}",
            summary.selected,
            summary.changed,
            summary.unchanged,
            summary.failed,
            summary.ambiguous
        );
        Ok(summary)
    }

    fn evaluate_player(
        &self,
        player: &PlayerRecord,
        now: DateTime<Utc>,
    ) -> CoreResult<PlayerOutcome> {
        let new_tier = tier_for_wager(player.total_wager);

        if new_tier == player.tier {
            // Still stamp the evaluation so the player is not
            // re-selected until the next day. No history row.
            self.store.touch_last_evaluated(&player.player_id, now)?;
            return Ok(PlayerOutcome::Unchanged);
        }

        // Push first; commit locally only on a definitive success.
        // last_evaluated_at stays untouched on failure, which is what
        // keeps the player eligible for retry.
        match self.sink.push_tier(&player.player_id, new_tier) {
            Ok(()) => {
                self.store
                    .commit_tier_change(&player.player_id, player.tier, new_tier, now)?;
                Ok(PlayerOutcome::Changed(player.tier, new_tier))
            }
            Err(PushError::Rejected { reason }) => Ok(PlayerOutcome::PushRejected(reason)),
            Err(PushError::Ambiguous { reason }) => Ok(PlayerOutcome::PushAmbiguous(reason)),
        }
    }

    /// Direct store access for the runner's summaries.
    pub fn store(&self) -> &FloorStore {
        &self.store
    }
}
