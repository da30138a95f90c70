//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Jobs call store methods — they never execute SQL directly, and
//! every statement is parameterized.
//!
//! Timestamps are stored as RFC 3339 TEXT in UTC, which keeps
//! lexicographic comparison equivalent to chronological comparison.

use crate::{
    error::{CoreError, CoreResult},
    monitor::AlertEvent,
    reclassifier::{PlayerRecord, TierHistoryRecord},
    telemetry::{MetricSample, SlotMachine},
    tier::Tier,
    types::{MachineId, MachineStatus, PlayerId},
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Outcome of an open-alert request. A machine that already has an
/// open alert is expected behavior (dedup), not a fault.
#[derive(Debug)]
pub enum AlertOpenOutcome {
    Opened(AlertEvent),
    AlreadyOpen,
}

pub struct FloorStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl FloorStore {
    pub fn open(path: &str) -> CoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases this returns a fresh, isolated database.
    pub fn reopen(&self) -> CoreResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> CoreResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_alerts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_players.sql"))?;
        Ok(())
    }

    // ── Machines ───────────────────────────────────────────────

    pub fn insert_machine(&self, m: &SlotMachine) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO slot_machine (machine_id, location, game_type, max_bet, last_maintenance_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &m.machine_id,
                &m.location,
                &m.game_type,
                m.max_bet,
                m.last_maintenance_at.map(|t| ts(&t)),
            ],
        )?;
        Ok(())
    }

    pub fn all_machines(&self) -> CoreResult<Vec<SlotMachine>> {
        let mut stmt = self.conn.prepare(
            "SELECT machine_id, location, game_type, max_bet, last_maintenance_at
             FROM slot_machine ORDER BY machine_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SlotMachine {
                machine_id: row.get(0)?,
                location: row.get(1)?,
                game_type: row.get(2)?,
                max_bet: row.get(3)?,
                last_maintenance_at: row
                    .get::<_, Option<String>>(4)?
                    .map(|raw| parse_ts(4, raw))
                    .transpose()?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn machine_count(&self) -> CoreResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM slot_machine", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ── Metric samples ─────────────────────────────────────────

    /// Append one immutable reading. Samples are facts; there is no
    /// update or delete path for this table.
    pub fn append_metric_sample(&self, s: &MetricSample) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO metric_sample (machine_id, utilization, revenue, spin_count, status, location, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &s.machine_id,
                s.utilization,
                s.revenue,
                s.spin_count,
                s.status.as_str(),
                &s.location,
                ts(&s.collected_at),
            ],
        )?;
        Ok(())
    }

    pub fn sample_count(&self) -> CoreResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM metric_sample", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn samples_for_machine(&self, machine_id: &str) -> CoreResult<Vec<MetricSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT machine_id, utilization, revenue, spin_count, status, location, collected_at
             FROM metric_sample WHERE machine_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![machine_id], |row| {
            Ok(MetricSample {
                machine_id: row.get(0)?,
                utilization: row.get(1)?,
                revenue: row.get(2)?,
                spin_count: row.get(3)?,
                status: MachineStatus::parse(&row.get::<_, String>(4)?),
                location: row.get(5)?,
                collected_at: parse_ts(6, row.get(6)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Alerts ─────────────────────────────────────────────────

    /// Open an alert for a machine unless one is already open.
    ///
    /// The partial unique index on (machine_id) WHERE resolved_at IS NULL
    /// backs the invariant at the schema level; a constraint hit is
    /// mapped to `AlreadyOpen` rather than surfaced as an error.
    pub fn open_alert(
        &self,
        machine_id: &MachineId,
        utilization: f64,
        location: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<AlertOpenOutcome> {
        if self.open_alert_for(machine_id)?.is_some() {
            return Ok(AlertOpenOutcome::AlreadyOpen);
        }
        let alert = AlertEvent {
            alert_id: Uuid::new_v4().to_string(),
            machine_id: machine_id.clone(),
            utilization,
            location: location.to_string(),
            created_at: now,
            notified_at: None,
            resolved_at: None,
        };
        let inserted = self.conn.execute(
            "INSERT INTO alert_event (alert_id, machine_id, utilization, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &alert.alert_id,
                &alert.machine_id,
                alert.utilization,
                &alert.location,
                ts(&alert.created_at),
            ],
        );
        match inserted {
            Ok(_) => Ok(AlertOpenOutcome::Opened(alert)),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(AlertOpenOutcome::AlreadyOpen)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn mark_alert_notified(&self, alert_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.conn.execute(
            "UPDATE alert_event SET notified_at = ?1 WHERE alert_id = ?2",
            params![ts(&now), alert_id],
        )?;
        Ok(())
    }

    /// Resolve the open alert for a machine, if any.
    /// Returns whether an alert was actually resolved.
    pub fn resolve_open_alert(
        &self,
        machine_id: &MachineId,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE alert_event SET resolved_at = ?1
             WHERE machine_id = ?2 AND resolved_at IS NULL",
            params![ts(&now), machine_id],
        )?;
        Ok(changed > 0)
    }

    pub fn open_alert_for(&self, machine_id: &str) -> CoreResult<Option<AlertEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT alert_id, machine_id, utilization, location, created_at, notified_at, resolved_at
             FROM alert_event
             WHERE machine_id = ?1 AND resolved_at IS NULL",
        )?;
        stmt.query_row(params![machine_id], alert_row_mapper)
            .optional()
            .map_err(Into::into)
    }

    pub fn open_alert_count(&self) -> CoreResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM alert_event WHERE resolved_at IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn alert_count(&self) -> CoreResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM alert_event", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn alerts_for_machine(&self, machine_id: &str) -> CoreResult<Vec<AlertEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT alert_id, machine_id, utilization, location, created_at, notified_at, resolved_at
             FROM alert_event WHERE machine_id = ?1
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![machine_id], alert_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Players ────────────────────────────────────────────────

    pub fn upsert_player(&self, p: &PlayerRecord) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO player (player_id, name, total_wager, tier, last_evaluated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(player_id) DO UPDATE SET
                name = excluded.name,
                total_wager = excluded.total_wager,
                tier = excluded.tier,
                last_evaluated_at = excluded.last_evaluated_at",
            params![
                &p.player_id,
                &p.name,
                p.total_wager,
                p.tier.as_str(),
                ts(&p.last_evaluated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_player(&self, player_id: &str) -> CoreResult<PlayerRecord> {
        self.conn
            .query_row(
                "SELECT player_id, name, total_wager, tier, last_evaluated_at
                 FROM player WHERE player_id = ?1",
                params![player_id],
                player_row_mapper,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CoreError::PlayerNotFound {
                    player_id: player_id.to_string(),
                },
                other => other.into(),
            })
    }

    /// Record wagering activity pushed in from the external data source.
    /// Wager totals only ever grow under normal operation.
    pub fn add_wager(&self, player_id: &str, amount: f64) -> CoreResult<()> {
        self.conn.execute(
            "UPDATE player SET total_wager = total_wager + ?1 WHERE player_id = ?2",
            params![amount, player_id],
        )?;
        Ok(())
    }

    /// Players whose last tier evaluation is older than the staleness
    /// window. Already-evaluated players are skipped, which is what makes
    /// a same-day re-run a no-op.
    pub fn players_due_for_evaluation(
        &self,
        now: DateTime<Utc>,
        staleness_hours: i64,
    ) -> CoreResult<Vec<PlayerRecord>> {
        let cutoff = now - Duration::hours(staleness_hours);
        let mut stmt = self.conn.prepare(
            "SELECT player_id, name, total_wager, tier, last_evaluated_at
             FROM player WHERE last_evaluated_at < ?1
             ORDER BY player_id ASC",
        )?;
        let rows = stmt.query_map(params![ts(&cutoff)], player_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn touch_last_evaluated(&self, player_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.conn.execute(
            "UPDATE player SET last_evaluated_at = ?1 WHERE player_id = ?2",
            params![ts(&now), player_id],
        )?;
        Ok(())
    }

    /// Atomically apply a tier change and append its audit record.
    ///
    /// The UPDATE is guarded by `tier = old_tier`; if the player's tier
    /// moved underneath us the transaction rolls back and the caller gets
    /// a desync error, so no history row can ever disagree with the
    /// player state it claims to describe.
    pub fn commit_tier_change(
        &self,
        player_id: &PlayerId,
        old_tier: Tier,
        new_tier: Tier,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE player SET tier = ?1, last_evaluated_at = ?2
             WHERE player_id = ?3 AND tier = ?4",
            params![new_tier.as_str(), ts(&now), player_id, old_tier.as_str()],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Err(CoreError::TierStateDesync {
                player_id: player_id.clone(),
                expected: old_tier.as_str().to_string(),
            });
        }
        tx.execute(
            "INSERT INTO tier_history (player_id, old_tier, new_tier, changed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![player_id, old_tier.as_str(), new_tier.as_str(), ts(&now)],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Tier history ───────────────────────────────────────────

    pub fn tier_history_for(&self, player_id: &str) -> CoreResult<Vec<TierHistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, old_tier, new_tier, changed_at
             FROM tier_history WHERE player_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![player_id], |row| {
            Ok(TierHistoryRecord {
                player_id: row.get(0)?,
                old_tier: Tier::parse(&row.get::<_, String>(1)?),
                new_tier: Tier::parse(&row.get::<_, String>(2)?),
                changed_at: parse_ts(3, row.get(3)?)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn tier_history_count(&self) -> CoreResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM tier_history", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn latest_tier_change(&self, player_id: &str) -> CoreResult<Option<TierHistoryRecord>> {
        Ok(self.tier_history_for(player_id)?.pop())
    }
}

fn alert_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertEvent> {
    Ok(AlertEvent {
        alert_id: row.get(0)?,
        machine_id: row.get(1)?,
        utilization: row.get(2)?,
        location: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
        notified_at: row
            .get::<_, Option<String>>(5)?
            .map(|raw| parse_ts(5, raw))
            .transpose()?,
        resolved_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_ts(6, raw))
            .transpose()?,
    })
}

fn player_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlayerRecord> {
    Ok(PlayerRecord {
        player_id: row.get(0)?,
        name: row.get(1)?,
        total_wager: row.get(2)?,
        tier: Tier::parse(&row.get::<_, String>(3)?),
        last_evaluated_at: parse_ts(4, row.get(4)?)?,
    })
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(column: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
