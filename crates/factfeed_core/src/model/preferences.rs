//! User notification preferences.
//!
//! # Responsibility
//! - Parse and normalize `HH:MM` notification slots.
//! - Hold the fact/question ratio and validate it sums to 100.
//! - Enforce subscription-tier limits on slots and items per slot.
//!
//! # Invariants
//! - `notification_times` is non-empty, unique and sorted by time-of-day.
//! - `ratio.fact_percent + ratio.question_percent == 100`.

use super::content::ExamType;
use super::validation::ValidationError;
use crate::config::TierLimit;
use chrono::{NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

static SLOT_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)$").expect("valid slot time regex"));

pub const DEFAULT_NOTIFICATION_TIMES: [&str; 4] = ["09:00", "13:00", "18:00", "21:00"];
pub const DEFAULT_ITEMS_PER_SLOT: u32 = 3;
pub const DEFAULT_FACT_PERCENT: u8 = 85;

/// Wall-clock notification time in the fixed civil timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(self) -> NaiveTime {
        self.0
    }

    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    pub fn minute(self) -> u32 {
        self.0.minute()
    }
}

impl FromStr for SlotTime {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidSlotTime(value.to_string());
        let caps = SLOT_TIME_RE.captures(value.trim()).ok_or_else(invalid)?;
        let hour = caps[1].parse::<u32>().map_err(|_| invalid())?;
        let minute = caps[2].parse::<u32>().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl Display for SlotTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a notification list into sorted unique slots.
///
/// # Errors
/// - `EmptyNotificationTimes` when `values` is empty.
/// - `InvalidSlotTime` for any value that is not `HH:MM`.
/// - `DuplicateSlotTime` when two values name the same time-of-day.
pub fn parse_notification_times<S: AsRef<str>>(
    values: &[S],
) -> Result<Vec<SlotTime>, ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::EmptyNotificationTimes);
    }
    let mut unique = BTreeSet::new();
    for value in values {
        let slot: SlotTime = value.as_ref().parse()?;
        if !unique.insert(slot) {
            return Err(ValidationError::DuplicateSlotTime(slot.to_string()));
        }
    }
    Ok(unique.into_iter().collect())
}

/// Target fact/question split, in whole percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRatio {
    pub fact_percent: u8,
    pub question_percent: u8,
}

impl ContentRatio {
    pub fn new(fact_percent: u8, question_percent: u8) -> Result<Self, ValidationError> {
        if u16::from(fact_percent) + u16::from(question_percent) != 100 {
            return Err(ValidationError::InvalidRatio {
                fact_percent,
                question_percent,
            });
        }
        Ok(Self {
            fact_percent,
            question_percent,
        })
    }
}

impl Default for ContentRatio {
    fn default() -> Self {
        Self {
            fact_percent: DEFAULT_FACT_PERCENT,
            question_percent: 100 - DEFAULT_FACT_PERCENT,
        }
    }
}

/// Stored per-user delivery preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: Uuid,
    pub notification_times: Vec<SlotTime>,
    pub items_per_slot: u32,
    pub exam_types: Vec<ExamType>,
    pub ratio: ContentRatio,
}

impl UserPreferences {
    /// Creates the registration-time defaults for a user.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            notification_times: DEFAULT_NOTIFICATION_TIMES
                .iter()
                .filter_map(|value| value.parse().ok())
                .collect(),
            items_per_slot: DEFAULT_ITEMS_PER_SLOT,
            exam_types: vec![ExamType::Upsc],
            ratio: ContentRatio::default(),
        }
    }

    /// Validates shape invariants independent of subscription tier.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.notification_times.is_empty() {
            return Err(ValidationError::EmptyNotificationTimes);
        }
        let unique: BTreeSet<_> = self.notification_times.iter().collect();
        if unique.len() != self.notification_times.len() {
            return Err(ValidationError::DuplicateSlotTime(
                first_duplicate(&self.notification_times).unwrap_or_default(),
            ));
        }
        if self.exam_types.is_empty() {
            return Err(ValidationError::EmptyExamTypes);
        }
        if self.items_per_slot == 0 {
            return Err(ValidationError::ItemsPerSlotOutOfRange {
                value: 0,
                max: u32::MAX,
            });
        }
        ContentRatio::new(self.ratio.fact_percent, self.ratio.question_percent)?;
        Ok(())
    }

    /// Validates slot and item counts against one tier's limit.
    pub fn validate_for_tier(&self, limit: TierLimit) -> Result<(), ValidationError> {
        self.validate()?;
        check_tier_limit(self.notification_times.len(), self.items_per_slot, limit)
    }
}

/// Checks a slot count and items-per-slot value against a tier limit.
pub fn check_tier_limit(
    notification_count: usize,
    items_per_slot: u32,
    limit: TierLimit,
) -> Result<(), ValidationError> {
    if items_per_slot == 0 || items_per_slot > limit.max_items_per_slot {
        return Err(ValidationError::ItemsPerSlotOutOfRange {
            value: items_per_slot,
            max: limit.max_items_per_slot,
        });
    }
    if let Some(max) = limit.max_notification_times {
        if notification_count > max as usize {
            return Err(ValidationError::TooManyNotificationTimes {
                count: notification_count,
                max,
            });
        }
    }
    Ok(())
}

fn first_duplicate(slots: &[SlotTime]) -> Option<String> {
    let mut seen = BTreeSet::new();
    slots
        .iter()
        .find(|slot| !seen.insert(**slot))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::{parse_notification_times, ContentRatio, SlotTime, UserPreferences};
    use crate::config::TierLimits;
    use crate::model::validation::ValidationError;
    use uuid::Uuid;

    #[test]
    fn slot_time_accepts_24h_values_and_normalizes_display() {
        assert_eq!("9:05".parse::<SlotTime>().unwrap().to_string(), "09:05");
        assert_eq!("23:59".parse::<SlotTime>().unwrap().to_string(), "23:59");
        for bad in ["24:00", "12:60", "1200", "ab:cd", "", "12:5"] {
            assert!(bad.parse::<SlotTime>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn notification_times_are_sorted_and_deduplicated_strictly() {
        let parsed = parse_notification_times(&["21:00", "09:00", "13:00"]).unwrap();
        let labels: Vec<String> = parsed.iter().map(ToString::to_string).collect();
        assert_eq!(labels, vec!["09:00", "13:00", "21:00"]);

        let err = parse_notification_times(&["09:00", "9:00"]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateSlotTime("09:00".into()));

        let empty: [&str; 0] = [];
        assert_eq!(
            parse_notification_times(&empty).unwrap_err(),
            ValidationError::EmptyNotificationTimes
        );
    }

    #[test]
    fn ratio_must_sum_to_100() {
        assert!(ContentRatio::new(85, 15).is_ok());
        assert!(ContentRatio::new(100, 0).is_ok());
        assert!(ContentRatio::new(50, 40).is_err());
    }

    #[test]
    fn free_tier_caps_slots_and_items() {
        let limits = TierLimits::default();
        let mut prefs = UserPreferences::defaults_for(Uuid::new_v4());
        assert!(prefs.validate_for_tier(limits.free).is_ok());

        prefs.items_per_slot = 5;
        assert!(matches!(
            prefs.validate_for_tier(limits.free),
            Err(ValidationError::ItemsPerSlotOutOfRange { value: 5, max: 3 })
        ));
        assert!(prefs.validate_for_tier(limits.premium).is_ok());

        prefs.items_per_slot = 3;
        prefs.notification_times = parse_notification_times(&[
            "06:00", "09:00", "12:00", "15:00", "18:00",
        ])
        .unwrap();
        assert!(matches!(
            prefs.validate_for_tier(limits.free),
            Err(ValidationError::TooManyNotificationTimes { count: 5, max: 4 })
        ));
    }
}
