//! Input validation errors shared by model constructors and the service layer.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Rejection raised before any store access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Slot time is not a valid 24h `HH:MM` value.
    InvalidSlotTime(String),
    /// Notification time list is empty.
    EmptyNotificationTimes,
    /// Notification time list repeats a slot.
    DuplicateSlotTime(String),
    /// Ratio percentages do not sum to 100.
    InvalidRatio { fact_percent: u8, question_percent: u8 },
    /// Items per slot is zero or above the tier maximum.
    ItemsPerSlotOutOfRange { value: u32, max: u32 },
    /// More notification times than the tier allows.
    TooManyNotificationTimes { count: usize, max: u32 },
    /// Exam filter is empty.
    EmptyExamTypes,
    /// Exam name is not one of the supported categories.
    UnknownExamType(String),
    /// Content type is neither `fact` nor `question`.
    UnknownContentType(String),
    /// Window end is not after window start.
    EmptyWindow,
    /// Page number or page size is zero.
    InvalidPage { page: u32, page_size: u32 },
    /// Mark request carries no content ids.
    EmptyContentIds,
    /// Content id does not exist in the content pool.
    UnknownContent(Uuid),
    /// Content item fields are inconsistent with its type.
    InvalidContent(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSlotTime(value) => {
                write!(f, "notification time must be HH:MM, got `{value}`")
            }
            Self::EmptyNotificationTimes => {
                write!(f, "at least one notification time is required")
            }
            Self::DuplicateSlotTime(value) => {
                write!(f, "notification time `{value}` is listed more than once")
            }
            Self::InvalidRatio {
                fact_percent,
                question_percent,
            } => write!(
                f,
                "fact and question percentages must sum to 100, got {fact_percent}+{question_percent}"
            ),
            Self::ItemsPerSlotOutOfRange { value, max } => {
                write!(f, "items per slot must be between 1 and {max}, got {value}")
            }
            Self::TooManyNotificationTimes { count, max } => write!(
                f,
                "subscription allows at most {max} notification times, got {count}"
            ),
            Self::EmptyExamTypes => write!(f, "at least one exam type is required"),
            Self::UnknownExamType(value) => write!(f, "unknown exam type `{value}`"),
            Self::UnknownContentType(value) => write!(f, "unknown content type `{value}`"),
            Self::EmptyWindow => write!(f, "window end must be after window start"),
            Self::InvalidPage { page, page_size } => write!(
                f,
                "page and page size must be at least 1, got page={page} page_size={page_size}"
            ),
            Self::EmptyContentIds => write!(f, "at least one content id is required"),
            Self::UnknownContent(id) => write!(f, "content item not found: {id}"),
            Self::InvalidContent(message) => write!(f, "invalid content item: {message}"),
        }
    }
}

impl Error for ValidationError {}
