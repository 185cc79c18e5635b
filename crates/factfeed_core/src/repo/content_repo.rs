//! Content pool contracts and SQLite implementation.
//!
//! # Responsibility
//! - Serve newest-first, per-type candidate lists filtered by exam type.
//! - Apply the per-user delivered-item exclusion inside the query.
//! - Provide the ingestion insert path used by tooling and tests.
//!
//! # Invariants
//! - Selection order is `created_at DESC, uuid ASC`.
//! - Reads never write; the pool is append-only from core's view.
//! - Write paths call `ContentItem::validate()` before SQL mutations.

use super::{ensure_connection_ready, parse_uuid, push_in_list, RepoError, RepoResult};
use crate::model::account::UserId;
use crate::model::content::{ContentId, ContentItem, ContentType, ExamType};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) const CONTENT_COLUMNS: &str = "c.uuid AS uuid,
    c.content_type AS content_type,
    c.exam_type AS exam_type,
    c.title AS title,
    c.description AS description,
    c.explanation AS explanation,
    c.category AS category,
    c.options_json AS options_json,
    c.correct_answer AS correct_answer,
    c.date_from AS date_from,
    c.date_to AS date_to,
    c.created_at AS created_at";

/// Candidate query for one content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    pub exam_types: Vec<ExamType>,
    pub content_type: ContentType,
    /// Maximum rows returned.
    pub limit: u32,
    /// Skip items already in this user's ledger.
    pub exclude_delivered_to: Option<UserId>,
    /// Only items whose `date_to` is on or after this day.
    pub valid_on: Option<NaiveDate>,
}

/// Fact/question totals for an exam filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCounts {
    pub facts: u64,
    pub questions: u64,
}

impl ContentCounts {
    pub fn total(&self) -> u64 {
        self.facts + self.questions
    }
}

/// Repository interface for the content pool.
pub trait ContentPool {
    /// Inserts one generated item. Ingestion path only.
    fn insert_content(&self, item: &ContentItem) -> RepoResult<ContentId>;
    /// Loads one item by id.
    fn get_content(&self, id: ContentId) -> RepoResult<Option<ContentItem>>;
    /// Returns newest-first candidates for one content type.
    fn select_newest(&self, query: &ContentQuery) -> RepoResult<Vec<ContentItem>>;
    /// Returns one random candidate, ignoring `query.limit`.
    fn select_random(&self, query: &ContentQuery) -> RepoResult<Option<ContentItem>>;
    /// Counts items per type, optionally excluding one user's deliveries.
    fn count_content(
        &self,
        exam_types: &[ExamType],
        exclude_delivered_to: Option<UserId>,
    ) -> RepoResult<ContentCounts>;
    /// Returns which of `ids` exist in the pool.
    fn existing_ids(&self, ids: &[ContentId]) -> RepoResult<HashSet<ContentId>>;
}

/// SQLite-backed content pool.
pub struct SqliteContentPool<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContentPool<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["content_items", "delivery_records"])?;
        Ok(Self { conn })
    }

    fn query_candidates(
        &self,
        query: &ContentQuery,
        order_and_limit: &str,
        mut bind_tail: Vec<Value>,
    ) -> RepoResult<Vec<ContentItem>> {
        let mut bind_values: Vec<Value> = Vec::new();
        let mut sql = format!(
            "SELECT {CONTENT_COLUMNS}
             FROM content_items c
             WHERE c.content_type = ?"
        );
        bind_values.push(Value::Text(query.content_type.as_str().to_string()));

        let placeholders = push_in_list(
            &mut bind_values,
            query.exam_types.iter().map(|exam| exam.as_str().to_string()),
        );
        sql.push_str(&format!(" AND c.exam_type IN ({placeholders})"));

        if let Some(user_id) = query.exclude_delivered_to {
            sql.push_str(
                " AND NOT EXISTS (
                    SELECT 1
                    FROM delivery_records d
                    WHERE d.content_uuid = c.uuid
                      AND d.user_uuid = ?
                )",
            );
            bind_values.push(Value::Text(user_id.to_string()));
        }

        if let Some(day) = query.valid_on {
            sql.push_str(" AND c.date_to >= ?");
            bind_values.push(Value::Text(day.format(DATE_FORMAT).to_string()));
        }

        sql.push(' ');
        sql.push_str(order_and_limit);
        bind_values.append(&mut bind_tail);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_content_row(row)?);
        }
        Ok(items)
    }
}

impl ContentPool for SqliteContentPool<'_> {
    fn insert_content(&self, item: &ContentItem) -> RepoResult<ContentId> {
        item.validate()?;

        let options_json = if item.options.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&item.options).map_err(|err| {
                RepoError::InvalidData(format!("cannot encode options for {}: {err}", item.id))
            })?)
        };

        self.conn.execute(
            "INSERT INTO content_items (
                uuid,
                content_type,
                exam_type,
                title,
                description,
                explanation,
                category,
                options_json,
                correct_answer,
                date_from,
                date_to,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                item.id.to_string(),
                item.content_type.as_str(),
                item.exam_type.as_str(),
                item.title.as_str(),
                item.description.as_str(),
                item.explanation.as_deref(),
                item.category.as_deref(),
                options_json,
                item.correct_answer.as_deref(),
                item.date_from.format(DATE_FORMAT).to_string(),
                item.date_to.format(DATE_FORMAT).to_string(),
                item.created_at,
            ],
        )?;

        Ok(item.id)
    }

    fn get_content(&self, id: ContentId) -> RepoResult<Option<ContentItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTENT_COLUMNS}
             FROM content_items c
             WHERE c.uuid = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_content_row(row)?));
        }
        Ok(None)
    }

    fn select_newest(&self, query: &ContentQuery) -> RepoResult<Vec<ContentItem>> {
        if query.limit == 0 || query.exam_types.is_empty() {
            return Ok(Vec::new());
        }
        self.query_candidates(
            query,
            "ORDER BY c.created_at DESC, c.uuid ASC LIMIT ?",
            vec![Value::Integer(i64::from(query.limit))],
        )
    }

    fn select_random(&self, query: &ContentQuery) -> RepoResult<Option<ContentItem>> {
        if query.exam_types.is_empty() {
            return Ok(None);
        }
        let mut items = self.query_candidates(query, "ORDER BY RANDOM() LIMIT 1", Vec::new())?;
        Ok(items.pop())
    }

    fn count_content(
        &self,
        exam_types: &[ExamType],
        exclude_delivered_to: Option<UserId>,
    ) -> RepoResult<ContentCounts> {
        if exam_types.is_empty() {
            return Ok(ContentCounts::default());
        }

        let mut bind_values: Vec<Value> = Vec::new();
        let placeholders = push_in_list(
            &mut bind_values,
            exam_types.iter().map(|exam| exam.as_str().to_string()),
        );
        let mut sql = format!(
            "SELECT
                COALESCE(SUM(CASE WHEN c.content_type = 'fact' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN c.content_type = 'question' THEN 1 ELSE 0 END), 0)
             FROM content_items c
             WHERE c.exam_type IN ({placeholders})"
        );
        if let Some(user_id) = exclude_delivered_to {
            sql.push_str(
                " AND NOT EXISTS (
                    SELECT 1
                    FROM delivery_records d
                    WHERE d.content_uuid = c.uuid
                      AND d.user_uuid = ?
                )",
            );
            bind_values.push(Value::Text(user_id.to_string()));
        }

        let (facts, questions): (i64, i64) =
            self.conn
                .query_row(&sql, params_from_iter(bind_values), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;

        Ok(ContentCounts {
            facts: u64::try_from(facts).unwrap_or(0),
            questions: u64::try_from(questions).unwrap_or(0),
        })
    }

    fn existing_ids(&self, ids: &[ContentId]) -> RepoResult<HashSet<ContentId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let mut bind_values: Vec<Value> = Vec::new();
        let placeholders = push_in_list(&mut bind_values, ids.iter().map(ToString::to_string));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT uuid FROM content_items WHERE uuid IN ({placeholders});"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut found = HashSet::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get(0)?;
            found.insert(parse_uuid(&uuid_text, "content_items.uuid")?);
        }
        Ok(found)
    }
}

/// Decodes a row selected with [`CONTENT_COLUMNS`].
pub(crate) fn parse_content_row(row: &Row<'_>) -> RepoResult<ContentItem> {
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "content_items.uuid")?;

    let type_text: String = row.get("content_type")?;
    let content_type = type_text.parse::<ContentType>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid content type `{type_text}` in content_items.content_type"
        ))
    })?;

    let exam_text: String = row.get("exam_type")?;
    let exam_type = exam_text.parse::<ExamType>().map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid exam type `{exam_text}` in content_items.exam_type"
        ))
    })?;

    let options = match row.get::<_, Option<String>>("options_json")? {
        Some(raw) => serde_json::from_str::<Vec<String>>(&raw).map_err(|err| {
            RepoError::InvalidData(format!("invalid options for {uuid_text}: {err}"))
        })?,
        None => Vec::new(),
    };

    let item = ContentItem {
        id,
        content_type,
        exam_type,
        title: row.get("title")?,
        description: row.get("description")?,
        explanation: row.get("explanation")?,
        category: row.get("category")?,
        options,
        correct_answer: row.get("correct_answer")?,
        date_from: parse_date(row.get("date_from")?, "content_items.date_from")?,
        date_to: parse_date(row.get("date_to")?, "content_items.date_to")?,
        created_at: row.get("created_at")?,
    };
    item.validate()
        .map_err(|err| RepoError::InvalidData(err.to_string()))?;
    Ok(item)
}

fn parse_date(value: String, column: &'static str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}
