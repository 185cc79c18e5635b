//! Delivery ledger record model.
//!
//! # Invariants
//! - `(user_id, content_id)` identifies a record and never changes.
//! - Only status, retry count and error text may change after creation.

use super::account::UserId;
use super::content::ContentId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const DEFAULT_PLATFORM: &str = "mobile";

/// Push delivery state of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Retrying,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns whether a record in this status may move to `next`.
    ///
    /// `sent` and `cancelled` are terminal.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Failed, Self::Retrying)
                | (Self::Failed, Self::Cancelled)
                | (Self::Retrying, Self::Sent)
                | (Self::Retrying, Self::Failed)
                | (Self::Retrying, Self::Cancelled)
        )
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown delivery status `{other}`")),
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (user, content item) delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub user_id: UserId,
    pub content_id: ContentId,
    /// Unix epoch milliseconds.
    pub delivered_at: i64,
    pub platform: String,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus;

    #[test]
    fn terminal_statuses_do_not_transition() {
        for next in [
            DeliveryStatus::Pending,
            DeliveryStatus::Failed,
            DeliveryStatus::Retrying,
            DeliveryStatus::Cancelled,
        ] {
            assert!(!DeliveryStatus::Sent.can_transition_to(next));
        }
        assert!(!DeliveryStatus::Cancelled.can_transition_to(DeliveryStatus::Sent));
    }

    #[test]
    fn failed_must_retry_before_sending() {
        assert!(!DeliveryStatus::Failed.can_transition_to(DeliveryStatus::Sent));
        assert!(DeliveryStatus::Failed.can_transition_to(DeliveryStatus::Retrying));
        assert!(DeliveryStatus::Retrying.can_transition_to(DeliveryStatus::Sent));
    }
}
