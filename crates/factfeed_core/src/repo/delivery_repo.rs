//! Delivery ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Record (user, content item) deliveries exactly once.
//! - Serve delivered-item history joined with content.
//! - Apply push status transitions without touching record identity.
//!
//! # Invariants
//! - At most one row exists per (user, content item); enforced by the
//!   unique constraint and an existence check inside one immediate
//!   transaction.
//! - `mark_delivered` commits every new row of a batch or none of them.
//! - Re-marking an already delivered pair is a successful no-op.

use super::content_repo::{parse_content_row, CONTENT_COLUMNS};
use super::{ensure_connection_ready, parse_uuid, push_in_list, RepoError, RepoResult};
use crate::model::account::UserId;
use crate::model::content::{ContentId, ContentItem, ExamType};
use crate::model::delivery::{DeliveryRecord, DeliveryStatus};
use log::warn;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior,
};
use std::collections::HashSet;

/// Counts reported by one `mark_delivered` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOutcome {
    /// Rows created by this call.
    pub newly_recorded: u32,
    /// Distinct ids that already had a record.
    pub already_recorded: u32,
}

/// History read bounds. `start_ms` inclusive, `end_ms` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub user_id: UserId,
    pub exam_types: Vec<ExamType>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub limit: u32,
    pub offset: u32,
}

/// One delivered item with its original delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub item: ContentItem,
    /// Unix epoch milliseconds.
    pub delivered_at: i64,
}

/// Repository interface for the delivery ledger.
pub trait DeliveryLedger {
    /// Records a `sent` delivery for every id without an existing record.
    fn mark_delivered(
        &self,
        user_id: UserId,
        content_ids: &[ContentId],
        delivered_at: i64,
        platform: &str,
    ) -> RepoResult<MarkOutcome>;
    /// Returns whether the pair has a record.
    fn is_delivered(&self, user_id: UserId, content_id: ContentId) -> RepoResult<bool>;
    /// Loads one record.
    fn get_record(
        &self,
        user_id: UserId,
        content_id: ContentId,
    ) -> RepoResult<Option<DeliveryRecord>>;
    /// Counts all records for one user.
    fn delivered_count(&self, user_id: UserId) -> RepoResult<u64>;
    /// Lists delivered items, newest delivery first.
    fn list_history(&self, query: &HistoryQuery) -> RepoResult<Vec<HistoryRow>>;
    /// Moves a record to `next` status if the transition is allowed.
    fn transition_status(
        &self,
        user_id: UserId,
        content_id: ContentId,
        next: DeliveryStatus,
        error_message: Option<&str>,
    ) -> RepoResult<DeliveryRecord>;
}

/// SQLite-backed delivery ledger.
pub struct SqliteDeliveryLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDeliveryLedger<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["delivery_records", "content_items"])?;
        Ok(Self { conn })
    }
}

impl DeliveryLedger for SqliteDeliveryLedger<'_> {
    fn mark_delivered(
        &self,
        user_id: UserId,
        content_ids: &[ContentId],
        delivered_at: i64,
        platform: &str,
    ) -> RepoResult<MarkOutcome> {
        let mut seen = HashSet::new();
        let unique: Vec<ContentId> = content_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if unique.is_empty() {
            return Ok(MarkOutcome::default());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        match record_missing(&tx, user_id, &unique, delivered_at, platform) {
            Ok(outcome) => {
                tx.commit()?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=mark_delivered module=ledger status=rollback_failed error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    fn is_delivered(&self, user_id: UserId, content_id: ContentId) -> RepoResult<bool> {
        record_exists(self.conn, user_id, content_id)
    }

    fn get_record(
        &self,
        user_id: UserId,
        content_id: ContentId,
    ) -> RepoResult<Option<DeliveryRecord>> {
        load_record(self.conn, user_id, content_id)
    }

    fn delivered_count(&self, user_id: UserId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM delivery_records WHERE user_uuid = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn list_history(&self, query: &HistoryQuery) -> RepoResult<Vec<HistoryRow>> {
        if query.exam_types.is_empty() || query.limit == 0 || query.start_ms >= query.end_ms {
            return Ok(Vec::new());
        }

        let mut bind_values: Vec<Value> = vec![
            Value::Text(query.user_id.to_string()),
            Value::Integer(query.start_ms),
            Value::Integer(query.end_ms),
        ];
        let placeholders = push_in_list(
            &mut bind_values,
            query.exam_types.iter().map(|exam| exam.as_str().to_string()),
        );
        bind_values.push(Value::Integer(i64::from(query.limit)));
        bind_values.push(Value::Integer(i64::from(query.offset)));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTENT_COLUMNS}, d.delivered_at AS delivered_at
             FROM delivery_records d
             INNER JOIN content_items c ON c.uuid = d.content_uuid
             WHERE d.user_uuid = ?
               AND d.delivered_at >= ?
               AND d.delivered_at < ?
               AND c.exam_type IN ({placeholders})
             ORDER BY d.delivered_at DESC, c.uuid ASC
             LIMIT ? OFFSET ?;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut history = Vec::new();
        while let Some(row) = rows.next()? {
            history.push(HistoryRow {
                item: parse_content_row(row)?,
                delivered_at: row.get("delivered_at")?,
            });
        }
        Ok(history)
    }

    fn transition_status(
        &self,
        user_id: UserId,
        content_id: ContentId,
        next: DeliveryStatus,
        error_message: Option<&str>,
    ) -> RepoResult<DeliveryRecord> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let current = load_record(&tx, user_id, content_id)?.ok_or_else(|| {
            RepoError::NotFound(format!("delivery record {user_id}/{content_id}"))
        })?;
        if !current.status.can_transition_to(next) {
            return Err(RepoError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let retry_increment = i64::from(next == DeliveryStatus::Retrying);
        tx.execute(
            "UPDATE delivery_records
             SET
                status = ?3,
                retry_count = retry_count + ?4,
                error_message = ?5
             WHERE user_uuid = ?1
               AND content_uuid = ?2;",
            params![
                user_id.to_string(),
                content_id.to_string(),
                next.as_str(),
                retry_increment,
                error_message,
            ],
        )?;
        let updated = load_record(&tx, user_id, content_id)?.ok_or_else(|| {
            RepoError::NotFound(format!("delivery record {user_id}/{content_id}"))
        })?;
        tx.commit()?;
        Ok(updated)
    }
}

fn record_missing(
    tx: &Transaction<'_>,
    user_id: UserId,
    content_ids: &[ContentId],
    delivered_at: i64,
    platform: &str,
) -> RepoResult<MarkOutcome> {
    let user_text = user_id.to_string();
    let mut outcome = MarkOutcome::default();
    for content_id in content_ids {
        if record_exists(tx, user_id, *content_id)? {
            outcome.already_recorded += 1;
            continue;
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO delivery_records (
                user_uuid,
                content_uuid,
                delivered_at,
                platform,
                status,
                retry_count
            ) VALUES (?1, ?2, ?3, ?4, 'sent', 0);",
            params![
                user_text.as_str(),
                content_id.to_string(),
                delivered_at,
                platform
            ],
        )?;
        if inserted == 1 {
            outcome.newly_recorded += 1;
        } else {
            outcome.already_recorded += 1;
        }
    }
    Ok(outcome)
}

fn record_exists(conn: &Connection, user_id: UserId, content_id: ContentId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM delivery_records
            WHERE user_uuid = ?1
              AND content_uuid = ?2
        );",
        params![user_id.to_string(), content_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_record(
    conn: &Connection,
    user_id: UserId,
    content_id: ContentId,
) -> RepoResult<Option<DeliveryRecord>> {
    let row = conn
        .query_row(
            "SELECT
                user_uuid,
                content_uuid,
                delivered_at,
                platform,
                status,
                retry_count,
                error_message
             FROM delivery_records
             WHERE user_uuid = ?1
               AND content_uuid = ?2;",
            params![user_id.to_string(), content_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((user_text, content_text, delivered_at, platform, status_text, retry_count, error)) =
        row
    else {
        return Ok(None);
    };
    let status = status_text.parse::<DeliveryStatus>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in delivery_records.status"
        ))
    })?;

    Ok(Some(DeliveryRecord {
        user_id: parse_uuid(&user_text, "delivery_records.user_uuid")?,
        content_id: parse_uuid(&content_text, "delivery_records.content_uuid")?,
        delivered_at,
        platform,
        status,
        retry_count,
        error_message: error,
    }))
}
