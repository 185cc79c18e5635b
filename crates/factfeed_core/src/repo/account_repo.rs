//! Account and preference store.
//!
//! # Responsibility
//! - Read user accounts and preference records for the scheduler.
//! - Provide upserts for the profile layer, tooling and tests.
//!
//! # Invariants
//! - Preferences are one-to-one with an account.
//! - Stored notification times are comma-joined sorted `HH:MM` labels.

use super::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use crate::model::account::{SubscriptionTier, UserAccount, UserId};
use crate::model::content::ExamType;
use crate::model::preferences::{parse_notification_times, ContentRatio, UserPreferences};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for account/preference reads and upserts.
pub trait AccountStore {
    fn upsert_account(&self, account: &UserAccount) -> RepoResult<()>;
    fn get_account(&self, user_id: UserId) -> RepoResult<Option<UserAccount>>;
    /// Replaces the preference record. The account must exist.
    fn upsert_preferences(&self, preferences: &UserPreferences) -> RepoResult<()>;
    fn get_preferences(&self, user_id: UserId) -> RepoResult<Option<UserPreferences>>;
}

/// SQLite-backed account store.
pub struct SqliteAccountStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountStore<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["user_accounts", "user_preferences"])?;
        Ok(Self { conn })
    }
}

impl AccountStore for SqliteAccountStore<'_> {
    fn upsert_account(&self, account: &UserAccount) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO user_accounts (
                user_uuid,
                created_at,
                subscription_tier,
                subscription_started_at,
                subscription_expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (user_uuid) DO UPDATE SET
                created_at = excluded.created_at,
                subscription_tier = excluded.subscription_tier,
                subscription_started_at = excluded.subscription_started_at,
                subscription_expires_at = excluded.subscription_expires_at;",
            params![
                account.user_id.to_string(),
                account.created_at,
                account.tier.as_str(),
                account.subscription_started_at,
                account.subscription_expires_at,
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, user_id: UserId) -> RepoResult<Option<UserAccount>> {
        let row = self
            .conn
            .query_row(
                "SELECT
                    created_at,
                    subscription_tier,
                    subscription_started_at,
                    subscription_expires_at
                 FROM user_accounts
                 WHERE user_uuid = ?1;",
                [user_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((created_at, tier_text, started_at, expires_at)) = row else {
            return Ok(None);
        };
        let tier = tier_text.parse::<SubscriptionTier>().map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid tier `{tier_text}` in user_accounts.subscription_tier"
            ))
        })?;

        Ok(Some(UserAccount {
            user_id,
            created_at,
            tier,
            subscription_started_at: started_at,
            subscription_expires_at: expires_at,
        }))
    }

    fn upsert_preferences(&self, preferences: &UserPreferences) -> RepoResult<()> {
        preferences.validate()?;

        let times = preferences
            .notification_times
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let exams = preferences
            .exam_types
            .iter()
            .map(|exam| exam.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let result = self.conn.execute(
            "INSERT INTO user_preferences (
                user_uuid,
                notification_times,
                items_per_slot,
                exam_types,
                fact_percent,
                question_percent
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (user_uuid) DO UPDATE SET
                notification_times = excluded.notification_times,
                items_per_slot = excluded.items_per_slot,
                exam_types = excluded.exam_types,
                fact_percent = excluded.fact_percent,
                question_percent = excluded.question_percent,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                preferences.user_id.to_string(),
                times,
                preferences.items_per_slot,
                exams,
                preferences.ratio.fact_percent,
                preferences.ratio.question_percent,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) =>
            {
                Err(RepoError::NotFound(format!(
                    "account {}",
                    preferences.user_id
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_preferences(&self, user_id: UserId) -> RepoResult<Option<UserPreferences>> {
        let row = self
            .conn
            .query_row(
                "SELECT
                    user_uuid,
                    notification_times,
                    items_per_slot,
                    exam_types,
                    fact_percent,
                    question_percent
                 FROM user_preferences
                 WHERE user_uuid = ?1;",
                [user_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u8>(4)?,
                        row.get::<_, u8>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((uuid_text, times, items_per_slot, exams, fact_percent, question_percent)) = row
        else {
            return Ok(None);
        };

        let labels: Vec<&str> = times.split(',').filter(|value| !value.is_empty()).collect();
        let notification_times = parse_notification_times(&labels).map_err(|err| {
            RepoError::InvalidData(format!("user_preferences.notification_times: {err}"))
        })?;
        let exam_types = exams
            .split(',')
            .filter(|value| !value.is_empty())
            .map(|value| value.parse::<ExamType>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| RepoError::InvalidData(format!("user_preferences.exam_types: {err}")))?;
        let ratio = ContentRatio::new(fact_percent, question_percent)
            .map_err(|err| RepoError::InvalidData(format!("user_preferences ratio: {err}")))?;

        Ok(Some(UserPreferences {
            user_id: parse_uuid(&uuid_text, "user_preferences.user_uuid")?,
            notification_times,
            items_per_slot,
            exam_types,
            ratio,
        }))
    }
}
