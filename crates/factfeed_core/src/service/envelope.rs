//! Request and result envelopes for delivery use-cases.
//!
//! Results serialize to JSON with RFC 3339 timestamps carrying the civil
//! offset.

use crate::model::account::{SubscriptionTier, UserId};
use crate::model::content::{ContentId, ContentItem, ExamType};
use crate::model::preferences::{ContentRatio, SlotTime};
use crate::repo::content_repo::ContentCounts;
use crate::schedule::slots::SyncKind;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Upper bound applied to history page sizes.
pub const MAX_HISTORY_PAGE_SIZE: u32 = 100;

/// Fetch request carrying explicit preferences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchBatchRequest {
    pub user_id: UserId,
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
    /// Raw `HH:MM` labels; validated by the service.
    pub notification_times: Vec<String>,
    pub items_per_slot: u32,
    /// Falls back to the configured default ratio.
    #[serde(default)]
    pub ratio: Option<ContentRatio>,
    /// Raw exam names; validated by the service.
    pub exam_types: Vec<String>,
}

/// Fact/question/total triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub facts: u32,
    pub questions: u32,
    pub total: u32,
}

impl TypeCounts {
    pub fn new(facts: u32, questions: u32) -> Self {
        Self {
            facts,
            questions,
            total: facts + questions,
        }
    }
}

impl From<ContentCounts> for TypeCounts {
    fn from(value: ContentCounts) -> Self {
        Self::new(
            u32::try_from(value.facts).unwrap_or(u32::MAX),
            u32::try_from(value.questions).unwrap_or(u32::MAX),
        )
    }
}

/// One item bound to its delivery instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledItem {
    #[serde(flatten)]
    pub item: ContentItem,
    pub scheduled_at: DateTime<FixedOffset>,
}

/// Describes what was requested and what could be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchMetadata {
    pub requested: TypeCounts,
    pub actual: TypeCounts,
    /// `requested.total - actual.total`; zero when the pool kept up.
    pub shortfall: u32,
    pub slot_count: u32,
    pub sync_kind: SyncKind,
    pub exam_types: Vec<ExamType>,
    pub subscription_tier: SubscriptionTier,
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
    pub notification_times: Vec<SlotTime>,
    pub items_per_slot: u32,
    pub ratio: ContentRatio,
}

/// Scheduled batch for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchBatchResult {
    /// Chronological, facts before questions.
    pub items: Vec<ScheduledItem>,
    pub metadata: BatchMetadata,
}

/// Mark-delivered request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MarkDeliveredRequest {
    pub user_id: UserId,
    pub content_ids: Vec<ContentId>,
    /// Defaults to `now`.
    #[serde(default)]
    pub delivered_at: Option<DateTime<FixedOffset>>,
    /// Defaults to `mobile`.
    #[serde(default)]
    pub platform: Option<String>,
}

/// Mark-delivered outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkResult {
    pub success: bool,
    pub newly_recorded: u32,
    pub already_recorded: u32,
}

/// History page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HistoryRequest {
    pub user_id: UserId,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

/// One delivered item with its original delivery instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub item: ContentItem,
    pub delivered_at: DateTime<FixedOffset>,
}

/// One page of delivery history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub page: u32,
    /// Effective page size after clamping.
    pub page_size: u32,
    /// Counts for this page only.
    pub counts: TypeCounts,
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
}

/// Pool totals and per-user undelivered counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityCounts {
    pub exam_types: Vec<ExamType>,
    pub total: TypeCounts,
    /// Present when the query named a user.
    pub undelivered: Option<TypeCounts>,
}
