//! Tier Reclassifier tests.
//!
//! Cover: the promotion scenario with its audit trail, no-op stamping,
//! same-day idempotence, per-player failure isolation, and the
//! ambiguous-push policy (no local commit, eligible next run).

mod common;

use chrono::Utc;
use common::{player, reclassify_config, store, ScriptedTierSink, SinkBehavior};
use slotfloor_core::{reclassifier::TierReclassifier, tier::Tier};

/// Player at 45k Gold whose wager grew to 60k: the next run pushes
/// Platinum, commits it, and appends (Gold, Platinum). A second
/// same-day run selects nothing.
#[test]
fn promotion_commits_tier_and_history() {
    let store = store();
    store.upsert_player(&player("P-001", 45_000.0, Tier::Gold, 48)).unwrap();
    store.add_wager("P-001", 15_000.0).unwrap();

    let (sink, pushes) = ScriptedTierSink::new(&[]);
    let mut job = TierReclassifier::new(store, Box::new(sink), reclassify_config());

    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(
        *pushes.lock().unwrap(),
        vec![("P-001".to_string(), Tier::Platinum)]
    );

    let p = job.store().get_player("P-001").unwrap();
    assert_eq!(p.tier, Tier::Platinum);
    let record = job.store().latest_tier_change("P-001").unwrap().unwrap();
    assert_eq!(record.old_tier, Tier::Gold);
    assert_eq!(record.new_tier, Tier::Platinum);

    // Second same-day run: lastEvaluated was stamped, nothing selected.
    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.selected, 0);
    assert_eq!(job.store().tier_history_count().unwrap(), 1);
}

/// An unchanged tier stamps the evaluation (so the player is skipped
/// until tomorrow) but writes no history record.
#[test]
fn no_change_stamps_without_history() {
    let store = store();
    store.upsert_player(&player("P-001", 5_000.0, Tier::Silver, 48)).unwrap();

    let (sink, pushes) = ScriptedTierSink::new(&[]);
    let mut job = TierReclassifier::new(store, Box::new(sink), reclassify_config());

    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.unchanged, 1);
    assert!(pushes.lock().unwrap().is_empty());
    assert_eq!(job.store().tier_history_count().unwrap(), 0);

    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.selected, 0);
}

/// One player's rejected push does not abort the batch, and leaves that
/// player eligible for the next run.
#[test]
fn rejected_push_is_isolated_and_retryable() {
    let store = common::shared_store("reclass_retry");
    store.upsert_player(&player("P-001", 60_000.0, Tier::Gold, 48)).unwrap();
    store.upsert_player(&player("P-002", 150_000.0, Tier::Platinum, 48)).unwrap();

    let (sink, _) = ScriptedTierSink::new(&[("P-001", SinkBehavior::Reject)]);
    let mut job = TierReclassifier::new(store, Box::new(sink), reclassify_config());

    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.selected, 2);
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.failed, 1);

    // P-002 committed; P-001 untouched.
    assert_eq!(job.store().get_player("P-002").unwrap().tier, Tier::Diamond);
    assert_eq!(job.store().get_player("P-001").unwrap().tier, Tier::Gold);
    assert_eq!(job.store().tier_history_count().unwrap(), 1);

    // The failed player is selected again; a sink that now accepts
    // finishes the job.
    let (sink, _) = ScriptedTierSink::new(&[]);
    let mut job = TierReclassifier::new(
        common::shared_store("reclass_retry"),
        Box::new(sink),
        reclassify_config(),
    );
    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(job.store().get_player("P-001").unwrap().tier, Tier::Platinum);
}

/// An ambiguous push (timeout after the remote may have applied it)
/// commits nothing locally: no tier change, no history row, no
/// evaluation stamp.
#[test]
fn ambiguous_push_commits_nothing() {
    let store = store();
    let before = player("P-001", 60_000.0, Tier::Gold, 48);
    store.upsert_player(&before).unwrap();

    let (sink, _) = ScriptedTierSink::new(&[("P-001", SinkBehavior::Ambiguous)]);
    let mut job = TierReclassifier::new(store, Box::new(sink), reclassify_config());

    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.ambiguous, 1);
    assert_eq!(summary.changed, 0);

    let after = job.store().get_player("P-001").unwrap();
    assert_eq!(after.tier, Tier::Gold);
    assert_eq!(after.last_evaluated_at, before.last_evaluated_at);
    assert_eq!(job.store().tier_history_count().unwrap(), 0);
}

/// After a successful run every changed player's tier equals the
/// newest history record's new_tier, and the record's old_tier is the
/// tier the player held going in.
#[test]
fn history_always_agrees_with_player_state() {
    let store = store();
    let fixtures = [
        ("P-001", 0.0, Tier::Silver),
        ("P-002", 12_000.0, Tier::Silver),
        ("P-003", 60_000.0, Tier::Gold),
        ("P-004", 150_000.0, Tier::Silver),
    ];
    for (id, wager, tier) in fixtures {
        store.upsert_player(&player(id, wager, tier, 48)).unwrap();
    }

    let (sink, _) = ScriptedTierSink::new(&[]);
    let mut job = TierReclassifier::new(store, Box::new(sink), reclassify_config());
    let summary = job.run(Utc::now()).unwrap();
    assert_eq!(summary.changed, 3);
    assert_eq!(summary.unchanged, 1);

    for (id, _, old_tier) in fixtures {
        let p = job.store().get_player(id).unwrap();
        match job.store().latest_tier_change(id).unwrap() {
            Some(record) => {
                assert_eq!(record.new_tier, p.tier, "{id}");
                assert_eq!(record.old_tier, old_tier, "{id}");
            }
            None => assert_eq!(p.tier, old_tier, "{id}"),
        }
    }
}
