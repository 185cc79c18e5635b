//! Content scheduling and delivery-dedup engine for factfeed.
//! This crate owns the no-repeat invariant and every scheduling rule.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{ConfigError, FeedConfig, TierLimit, TierLimits};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::account::{SubscriptionTier, UserAccount, UserId};
pub use model::content::{ContentId, ContentItem, ContentType, ExamType};
pub use model::delivery::{DeliveryRecord, DeliveryStatus};
pub use model::preferences::{ContentRatio, SlotTime, UserPreferences};
pub use model::validation::ValidationError;
pub use repo::account_repo::{AccountStore, SqliteAccountStore};
pub use repo::content_repo::{ContentPool, SqliteContentPool};
pub use repo::delivery_repo::{DeliveryLedger, SqliteDeliveryLedger};
pub use repo::{RepoError, RepoResult};
pub use service::delivery_service::{DeliveryService, ServiceError};
pub use service::envelope::{
    AvailabilityCounts, FetchBatchRequest, FetchBatchResult, HistoryPage, HistoryRequest,
    MarkDeliveredRequest, MarkResult,
};

/// SQLite-backed service borrowing one connection.
pub type SqliteDeliveryService<'conn> = DeliveryService<
    SqliteContentPool<'conn>,
    SqliteAccountStore<'conn>,
    SqliteDeliveryLedger<'conn>,
>;

/// Builds the SQLite-backed service over a migrated connection.
pub fn sqlite_service(
    conn: &rusqlite::Connection,
    config: FeedConfig,
) -> RepoResult<SqliteDeliveryService<'_>> {
    Ok(DeliveryService::new(
        SqliteContentPool::try_new(conn)?,
        SqliteAccountStore::try_new(conn)?,
        SqliteDeliveryLedger::try_new(conn)?,
        config,
    ))
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, open_db_in_memory, sqlite_service, FeedConfig};

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn service_builds_over_migrated_connection() {
        let conn = open_db_in_memory().expect("open db");
        assert!(sqlite_service(&conn, FeedConfig::default()).is_ok());
    }
}
