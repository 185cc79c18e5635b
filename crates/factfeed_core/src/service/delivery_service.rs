//! Delivery use-case service.
//!
//! # Responsibility
//! - Validate fetch/mark/history inputs before any store access.
//! - Wire slot planning, selection and assignment into one fetch call.
//! - Map repository failures onto the caller-facing `ServiceError`.
//!
//! # Invariants
//! - Fetch paths never write.
//! - Content shortfall is reported in metadata, never as an error.
//! - Only `mark_delivered` and `update_delivery_status` touch the ledger
//!   for writes.

use super::envelope::{
    AvailabilityCounts, BatchMetadata, FetchBatchRequest, FetchBatchResult, HistoryItem,
    HistoryPage, HistoryRequest, MarkDeliveredRequest, MarkResult, ScheduledItem, TypeCounts,
    MAX_HISTORY_PAGE_SIZE,
};
use crate::config::FeedConfig;
use crate::model::account::{UserAccount, UserId};
use crate::model::content::{ContentId, ContentItem, ContentType, ExamType};
use crate::model::delivery::{DeliveryRecord, DeliveryStatus, DEFAULT_PLATFORM};
use crate::model::preferences::{
    check_tier_limit, parse_notification_times, ContentRatio, SlotTime, UserPreferences,
};
use crate::model::validation::ValidationError;
use crate::repo::account_repo::AccountStore;
use crate::repo::content_repo::{ContentPool, ContentQuery};
use crate::repo::delivery_repo::{DeliveryLedger, HistoryQuery};
use crate::repo::RepoError;
use crate::schedule::assign::assign_slots;
use crate::schedule::selection::{ContentSelector, SelectionPlan, SelectionRequest};
use crate::schedule::slots::{bound_window, civil_instant, plan_slots, SlotRequest};
use chrono::{DateTime, FixedOffset, NaiveTime};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const MS_PER_DAY: i64 = 86_400_000;

/// Caller-facing error for delivery use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Input rejected before store access.
    Validation(ValidationError),
    /// Account, preferences or ledger record missing.
    NotFound(String),
    /// Operation needs an active premium or trial subscription.
    PremiumRequired,
    /// Store unreachable, busy or timed out. Safe to retry.
    StoreUnavailable(RepoError),
    /// Ledger status change not permitted.
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// Persisted data could not be decoded.
    InvalidData(String),
    /// Any other persistence failure.
    Repo(RepoError),
}

impl ServiceError {
    /// Returns whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::PremiumRequired => "premium_required",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidData(_) => "invalid_data",
            Self::Repo(_) => "repo_error",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::PremiumRequired => write!(f, "an active premium subscription is required"),
            Self::StoreUnavailable(err) => write!(f, "store unavailable: {err}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "delivery status cannot move from `{from}` to `{to}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StoreUnavailable(err) | Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        if value.is_unavailable() {
            return Self::StoreUnavailable(value);
        }
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(what) => Self::NotFound(what),
            RepoError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            RepoError::InvalidData(message) => Self::InvalidData(message),
            other => Self::Repo(other),
        }
    }
}

/// Validated fetch inputs shared by explicit and stored-preference fetches.
struct FetchPlan {
    user_id: UserId,
    from: DateTime<FixedOffset>,
    to: DateTime<FixedOffset>,
    notification_times: Vec<SlotTime>,
    items_per_slot: u32,
    exam_types: Vec<ExamType>,
    ratio: ContentRatio,
}

/// Delivery service facade over the content pool, account store and ledger.
pub struct DeliveryService<P, A, L>
where
    P: ContentPool,
    A: AccountStore,
    L: DeliveryLedger,
{
    pool: P,
    accounts: A,
    ledger: L,
    config: FeedConfig,
}

impl<P, A, L> DeliveryService<P, A, L>
where
    P: ContentPool,
    A: AccountStore,
    L: DeliveryLedger,
{
    /// Creates a service using the provided repository implementations.
    pub fn new(pool: P, accounts: A, ledger: L, config: FeedConfig) -> Self {
        Self {
            pool,
            accounts,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Schedules undelivered content for a window using explicit preferences.
    ///
    /// # Errors
    /// - `Validation` for malformed times, exams, ratio, window or tier limits.
    /// - `NotFound` when the account does not exist.
    /// - `StoreUnavailable` when the pool cannot be read.
    pub fn fetch_batch(
        &self,
        request: &FetchBatchRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<FetchBatchResult, ServiceError> {
        let ratio = match request.ratio {
            Some(ratio) => ContentRatio::new(ratio.fact_percent, ratio.question_percent)?,
            None => self.config.default_ratio,
        };
        // Tier-dependent upper bound is checked once the account is loaded.
        if request.items_per_slot == 0 {
            return Err(ValidationError::ItemsPerSlotOutOfRange {
                value: 0,
                max: self.config.tier_limits.premium.max_items_per_slot,
            }
            .into());
        }
        let plan = FetchPlan {
            user_id: request.user_id,
            from: request.from,
            to: request.to,
            notification_times: parse_notification_times(request.notification_times.as_slice())?,
            items_per_slot: request.items_per_slot,
            exam_types: parse_exam_types(request.exam_types.as_slice())?,
            ratio,
        };
        self.run_fetch(plan, now)
    }

    /// Schedules undelivered content using the user's stored preferences.
    ///
    /// The configured default ratio applies, not the stored one.
    pub fn fetch_scheduled(
        &self,
        user_id: UserId,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> Result<FetchBatchResult, ServiceError> {
        let preferences = self.load_preferences(user_id)?;
        preferences.validate()?;
        let plan = FetchPlan {
            user_id,
            from,
            to,
            notification_times: preferences.notification_times,
            items_per_slot: preferences.items_per_slot,
            exam_types: preferences.exam_types,
            ratio: self.config.default_ratio,
        };
        self.run_fetch(plan, now)
    }

    /// Records deliveries; already delivered items are skipped.
    ///
    /// # Errors
    /// - `Validation` for an empty id list or ids missing from the pool.
    /// - `NotFound` when the account does not exist.
    /// - `StoreUnavailable` when the ledger transaction cannot start or
    ///   commit; nothing is recorded in that case.
    pub fn mark_delivered(
        &self,
        request: &MarkDeliveredRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<MarkResult, ServiceError> {
        let started_at = Instant::now();
        if request.content_ids.is_empty() {
            return Err(ValidationError::EmptyContentIds.into());
        }

        self.load_account(request.user_id)?;
        let existing = self.pool.existing_ids(&request.content_ids)?;
        if let Some(missing) = request
            .content_ids
            .iter()
            .find(|content_id| !existing.contains(content_id))
        {
            return Err(ValidationError::UnknownContent(*missing).into());
        }

        let delivered_at = request.delivered_at.unwrap_or(now).timestamp_millis();
        let platform = request.platform.as_deref().unwrap_or(DEFAULT_PLATFORM);
        match self.ledger.mark_delivered(
            request.user_id,
            &request.content_ids,
            delivered_at,
            platform,
        ) {
            Ok(outcome) => {
                info!(
                    "event=mark_delivered module=service status=ok requested={} newly_recorded={} already_recorded={} duration_ms={}",
                    request.content_ids.len(),
                    outcome.newly_recorded,
                    outcome.already_recorded,
                    started_at.elapsed().as_millis()
                );
                Ok(MarkResult {
                    success: true,
                    newly_recorded: outcome.newly_recorded,
                    already_recorded: outcome.already_recorded,
                })
            }
            Err(err) => {
                let err = ServiceError::from(err);
                error!(
                    "event=mark_delivered module=service status=error requested={} error_code={} retryable={}",
                    request.content_ids.len(),
                    err.code(),
                    err.is_retryable()
                );
                Err(err)
            }
        }
    }

    /// Reads one page of delivered items.
    ///
    /// The window is `[max(now - retention, subscription start), start of
    /// today)` and items are limited to the user's current exam filters.
    /// Tier gating is left to the caller; see [`Self::history_for_tier`].
    pub fn history(
        &self,
        request: &HistoryRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<HistoryPage, ServiceError> {
        if request.page == 0 || request.page_size == 0 {
            return Err(ValidationError::InvalidPage {
                page: request.page,
                page_size: request.page_size,
            }
            .into());
        }
        let account = self.load_account(request.user_id)?;
        let preferences = self.load_preferences(request.user_id)?;
        self.read_history(request, &account, &preferences, now)
    }

    /// Reads history only for premium-capable accounts.
    ///
    /// # Errors
    /// - `PremiumRequired` for free accounts and lapsed subscriptions.
    pub fn history_for_tier(
        &self,
        request: &HistoryRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<HistoryPage, ServiceError> {
        let account = self.load_account(request.user_id)?;
        if !account.is_premium_capable(now.timestamp_millis()) {
            info!(
                "event=history_read module=service status=denied tier={}",
                account.tier
            );
            return Err(ServiceError::PremiumRequired);
        }
        self.history(request, now)
    }

    /// Returns one random item of `content_type` for the user's exams.
    ///
    /// Prefers undelivered items and falls back to any item of that type.
    /// Returns `None` only when the pool holds nothing matching.
    pub fn random_item(
        &self,
        user_id: UserId,
        content_type: ContentType,
        now: DateTime<FixedOffset>,
    ) -> Result<Option<ContentItem>, ServiceError> {
        let preferences = self.load_preferences(user_id)?;
        let mut query = ContentQuery {
            exam_types: preferences.exam_types,
            content_type,
            limit: 1,
            exclude_delivered_to: Some(user_id),
            valid_on: self.valid_on(now),
        };
        if let Some(item) = self.pool.select_random(&query)? {
            return Ok(Some(item));
        }

        query.exclude_delivered_to = None;
        let fallback = self.pool.select_random(&query)?;
        if fallback.is_some() {
            info!(
                "event=select_content module=service status=fallback content_type={content_type}"
            );
        }
        Ok(fallback)
    }

    /// Counts pool content per type, plus the user's undelivered share.
    pub fn available_content(
        &self,
        exam_types: &[String],
        user_id: Option<UserId>,
    ) -> Result<AvailabilityCounts, ServiceError> {
        let exam_types = parse_exam_types(exam_types)?;
        let total = self.pool.count_content(&exam_types, None)?;
        let undelivered = match user_id {
            Some(user_id) => Some(self.pool.count_content(&exam_types, Some(user_id))?.into()),
            None => None,
        };
        Ok(AvailabilityCounts {
            exam_types,
            total: total.into(),
            undelivered,
        })
    }

    /// Applies a push status change to an existing ledger record.
    pub fn update_delivery_status(
        &self,
        user_id: UserId,
        content_id: ContentId,
        next: DeliveryStatus,
        error_message: Option<&str>,
    ) -> Result<DeliveryRecord, ServiceError> {
        let record = self
            .ledger
            .transition_status(user_id, content_id, next, error_message)?;
        info!(
            "event=delivery_status module=service status=ok next={} retry_count={}",
            record.status, record.retry_count
        );
        Ok(record)
    }

    /// Validates preferences against the account's tier and stores them.
    pub fn save_preferences(
        &self,
        preferences: &UserPreferences,
        now: DateTime<FixedOffset>,
    ) -> Result<(), ServiceError> {
        let account = self.load_account(preferences.user_id)?;
        let limit = self.config.tier_limits.for_tier(
            account.tier,
            account.is_premium_capable(now.timestamp_millis()),
        );
        preferences.validate_for_tier(limit)?;
        self.accounts.upsert_preferences(preferences)?;
        Ok(())
    }

    fn run_fetch(
        &self,
        plan: FetchPlan,
        now: DateTime<FixedOffset>,
    ) -> Result<FetchBatchResult, ServiceError> {
        let started_at = Instant::now();
        let offset = self.config.civil_offset();
        let now = now.with_timezone(&offset);
        let from = plan.from.with_timezone(&offset);
        let requested_to = plan.to.with_timezone(&offset);

        let to = bound_window(from, requested_to, self.config.max_window_days)?;
        if to < requested_to {
            info!(
                "event=fetch_batch module=service status=window_clamped max_window_days={}",
                self.config.max_window_days
            );
        }
        let account = self.load_account(plan.user_id)?;
        let limit = self.config.tier_limits.for_tier(
            account.tier,
            account.is_premium_capable(now.timestamp_millis()),
        );
        check_tier_limit(
            plan.notification_times.len(),
            plan.items_per_slot,
            limit,
        )?;

        let slots = plan_slots(&SlotRequest {
            now,
            from,
            to,
            notification_times: &plan.notification_times,
            account_created_at: self.instant_from_ms(account.created_at)?,
            offset,
        });
        let slot_count = u32::try_from(slots.total_slots()).unwrap_or(u32::MAX);
        let selection_plan =
            SelectionPlan::from_ratio(slot_count.saturating_mul(plan.items_per_slot), plan.ratio);

        let selection = ContentSelector::new(&self.pool)
            .select(&SelectionRequest {
                user_id: plan.user_id,
                exam_types: plan.exam_types.clone(),
                plan: selection_plan,
                valid_on: self.valid_on(now),
            })
            .map_err(|err| {
                let err = ServiceError::from(err);
                error!(
                    "event=select_content module=service status=error error_code={} retryable={}",
                    err.code(),
                    err.is_retryable()
                );
                err
            })?;
        info!(
            "event=select_content module=service status=ok requested_facts={} requested_questions={} facts={} questions={}",
            selection_plan.facts,
            selection_plan.questions,
            selection.facts.len(),
            selection.questions.len()
        );

        let assignment = assign_slots(selection, &slots, plan.items_per_slot);
        let requested = TypeCounts::new(selection_plan.facts, selection_plan.questions);
        let actual = TypeCounts::new(assignment.facts, assignment.questions);
        let shortfall = requested.total.saturating_sub(actual.total);
        if shortfall > 0 {
            warn!(
                "event=content_shortfall module=service status=partial requested={} actual={} shortfall={}",
                requested.total, actual.total, shortfall
            );
        }
        info!(
            "event=fetch_batch module=service status=ok sync_kind={:?} slots={} scheduled={} dropped={} duration_ms={}",
            slots.kind,
            slot_count,
            actual.total,
            assignment.dropped,
            started_at.elapsed().as_millis()
        );

        Ok(FetchBatchResult {
            items: assignment
                .items
                .into_iter()
                .map(|scheduled| ScheduledItem {
                    item: scheduled.item,
                    scheduled_at: scheduled.scheduled_at,
                })
                .collect(),
            metadata: BatchMetadata {
                requested,
                actual,
                shortfall,
                slot_count,
                sync_kind: slots.kind,
                exam_types: plan.exam_types,
                subscription_tier: account.tier,
                window_start: from,
                window_end: to,
                notification_times: plan.notification_times,
                items_per_slot: plan.items_per_slot,
                ratio: plan.ratio,
            },
        })
    }

    fn read_history(
        &self,
        request: &HistoryRequest,
        account: &UserAccount,
        preferences: &UserPreferences,
        now: DateTime<FixedOffset>,
    ) -> Result<HistoryPage, ServiceError> {
        let offset = self.config.civil_offset();
        let now = now.with_timezone(&offset);
        let page_size = request.page_size.min(MAX_HISTORY_PAGE_SIZE);

        let retention_start =
            now.timestamp_millis() - i64::from(self.config.history_retention_days) * MS_PER_DAY;
        let start_ms = account
            .subscription_started_at
            .map_or(retention_start, |started_at| started_at.max(retention_start));
        let window_end = civil_instant(now.date_naive(), NaiveTime::MIN, offset);
        let window_start = self.instant_from_ms(start_ms)?;

        let rows = self.ledger.list_history(&HistoryQuery {
            user_id: request.user_id,
            exam_types: preferences.exam_types.clone(),
            start_ms,
            end_ms: window_end.timestamp_millis(),
            limit: page_size,
            offset: (request.page - 1).saturating_mul(page_size),
        })?;

        let mut items = Vec::with_capacity(rows.len());
        let (mut facts, mut questions) = (0u32, 0u32);
        for row in rows {
            match row.item.content_type {
                ContentType::Fact => facts += 1,
                ContentType::Question => questions += 1,
            }
            items.push(HistoryItem {
                delivered_at: self.instant_from_ms(row.delivered_at)?,
                item: row.item,
            });
        }
        info!(
            "event=history_read module=service status=ok page={} page_size={} items={}",
            request.page,
            page_size,
            items.len()
        );

        Ok(HistoryPage {
            items,
            page: request.page,
            page_size,
            counts: TypeCounts::new(facts, questions),
            window_start: window_start.min(window_end),
            window_end,
        })
    }

    fn load_account(&self, user_id: UserId) -> Result<UserAccount, ServiceError> {
        self.accounts
            .get_account(user_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("account {user_id}")))
    }

    fn load_preferences(&self, user_id: UserId) -> Result<UserPreferences, ServiceError> {
        self.accounts
            .get_preferences(user_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("preferences for {user_id}")))
    }

    fn valid_on(&self, now: DateTime<FixedOffset>) -> Option<chrono::NaiveDate> {
        self.config
            .respect_validity_window
            .then(|| now.with_timezone(&self.config.civil_offset()).date_naive())
    }

    fn instant_from_ms(&self, value: i64) -> Result<DateTime<FixedOffset>, ServiceError> {
        DateTime::from_timestamp_millis(value)
            .map(|instant| instant.with_timezone(&self.config.civil_offset()))
            .ok_or_else(|| ServiceError::InvalidData(format!("timestamp {value} out of range")))
    }
}

/// Parses and deduplicates exam filters, keeping first-seen order.
fn parse_exam_types<S: AsRef<str>>(values: &[S]) -> Result<Vec<ExamType>, ValidationError> {
    let mut exam_types = Vec::new();
    for value in values {
        let exam: ExamType = value.as_ref().parse()?;
        if !exam_types.contains(&exam) {
            exam_types.push(exam);
        }
    }
    if exam_types.is_empty() {
        return Err(ValidationError::EmptyExamTypes);
    }
    Ok(exam_types)
}

#[cfg(test)]
mod tests {
    use super::{parse_exam_types, ServiceError};
    use crate::db::DbError;
    use crate::model::content::ExamType;
    use crate::model::validation::ValidationError;
    use crate::repo::RepoError;

    #[test]
    fn exam_filter_is_deduplicated_and_case_insensitive() {
        let parsed = parse_exam_types(&["upsc", "SSC", "UPSC"]).unwrap();
        assert_eq!(parsed, vec![ExamType::Upsc, ExamType::Ssc]);

        let empty: [&str; 0] = [];
        assert_eq!(
            parse_exam_types(&empty).unwrap_err(),
            ValidationError::EmptyExamTypes
        );
        assert!(parse_exam_types(&["NEET"]).is_err());
    }

    #[test]
    fn busy_store_maps_to_retryable_error() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = ServiceError::from(RepoError::Db(DbError::Sqlite(busy)));
        assert!(matches!(err, ServiceError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        let err = ServiceError::from(RepoError::NotFound("account x".into()));
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(!err.is_retryable());
    }
}
