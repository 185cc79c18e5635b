//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define data access contracts for the content pool, account store and
//!   delivery ledger.
//! - Isolate SQL details from scheduling and service orchestration.
//!
//! # Invariants
//! - Repositories refuse connections whose schema is not fully migrated.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Only the delivery ledger writes `delivery_records`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::delivery::DeliveryStatus;
use crate::model::validation::ValidationError;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod account_repo;
pub mod content_repo;
pub mod delivery_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all feed stores.
#[derive(Debug)]
pub enum RepoError {
    /// Write rejected by model validation.
    Validation(ValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist.
    NotFound(String),
    /// Ledger status change not permitted from the current status.
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
}

impl RepoError {
    /// Returns whether the store could not be reached or stayed locked.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_unavailable())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "delivery status cannot move from `{from}` to `{to}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "feed repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "feed repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted feed data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Verifies the connection is migrated and carries the given tables.
fn ensure_connection_ready(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Builds `?, ?, ?` for an `IN (...)` clause and appends the bind values.
fn push_in_list<I, T>(bind_values: &mut Vec<Value>, values: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    let mut placeholders = Vec::new();
    for value in values {
        bind_values.push(value.into());
        placeholders.push("?");
    }
    placeholders.join(", ")
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
