//! Feed engine configuration.
//!
//! # Responsibility
//! - Hold the fixed civil timezone, default content ratio, retention window
//!   and tier limits that every component call receives explicitly.
//! - Load and validate configuration from TOML.
//!
//! # Invariants
//! - A validated config always has a representable UTC offset and a ratio
//!   whose percentages sum to 100.
//! - Nothing in core reads configuration from process-global state.

use crate::model::account::SubscriptionTier;
use crate::model::preferences::ContentRatio;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

/// IST, UTC+05:30.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;
pub const DEFAULT_HISTORY_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_WINDOW_DAYS: u32 = 7;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Per-tier scheduling limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    /// Maximum notification slots per day. `None` means unlimited.
    pub max_notification_times: Option<u32>,
    /// Maximum items delivered in one slot.
    pub max_items_per_slot: u32,
}

/// Scheduling limits for free and premium-capable tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub free: TierLimit,
    /// Applies to `premium` and active `trial` accounts.
    pub premium: TierLimit,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            free: TierLimit {
                max_notification_times: Some(4),
                max_items_per_slot: 3,
            },
            premium: TierLimit {
                max_notification_times: None,
                max_items_per_slot: 10,
            },
        }
    }
}

impl TierLimits {
    /// Returns the limit that applies to a tier.
    ///
    /// `premium_capable` comes from [`crate::UserAccount::is_premium_capable`]
    /// so that an expired trial falls back to free limits.
    pub fn for_tier(&self, tier: SubscriptionTier, premium_capable: bool) -> TierLimit {
        match tier {
            SubscriptionTier::Premium | SubscriptionTier::Trial if premium_capable => self.premium,
            _ => self.free,
        }
    }
}

/// Optional file logging settings consumed by binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<String>,
}

/// Configuration threaded into every feed engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Fixed civil offset all slot arithmetic runs in.
    pub utc_offset_minutes: i32,
    /// Ratio used when a request does not carry its own.
    pub default_ratio: ContentRatio,
    /// How far back history reads may reach.
    pub history_retention_days: u32,
    /// Longest fetch window scheduled, in days. Longer requests are cut
    /// back to this many days from their start.
    pub max_window_days: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Restrict selection to items whose `date_to` has not lapsed.
    pub respect_validity_window: bool,
    pub tier_limits: TierLimits,
    pub logging: LoggingConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            default_ratio: ContentRatio::default(),
            history_retention_days: DEFAULT_HISTORY_RETENTION_DAYS,
            max_window_days: DEFAULT_MAX_WINDOW_DAYS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            respect_validity_window: false,
            tier_limits: TierLimits::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}, got {}",
                self.utc_offset_minutes
            )));
        }
        ContentRatio::new(
            self.default_ratio.fact_percent,
            self.default_ratio.question_percent,
        )
        .map_err(|err| ConfigError::Invalid(format!("default_ratio: {err}")))?;
        if self.history_retention_days == 0 {
            return Err(ConfigError::Invalid(
                "history_retention_days must be at least 1".to_string(),
            ));
        }
        if self.max_window_days == 0 {
            return Err(ConfigError::Invalid(
                "max_window_days must be at least 1".to_string(),
            ));
        }
        for (name, limit) in [
            ("free", self.tier_limits.free),
            ("premium", self.tier_limits.premium),
        ] {
            if limit.max_items_per_slot == 0 || limit.max_notification_times == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "tier_limits.{name} must allow at least one slot and one item"
                )));
            }
        }
        Ok(())
    }

    /// Returns the fixed civil offset.
    ///
    /// Falls back to UTC only for an unvalidated out-of-range value.
    pub fn civil_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, FeedConfig};
    use crate::model::account::SubscriptionTier;

    #[test]
    fn defaults_match_ist_and_85_15_ratio() {
        let config = FeedConfig::default();
        assert_eq!(config.civil_offset().local_minus_utc(), 330 * 60);
        assert_eq!(config.default_ratio.fact_percent, 85);
        assert_eq!(config.default_ratio.question_percent, 15);
        assert_eq!(config.history_retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_keys() {
        let config = FeedConfig::from_toml_str(
            "utc_offset_minutes = 0\n\n[default_ratio]\nfact_percent = 70\nquestion_percent = 30\n",
        )
        .expect("partial config should parse");
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.default_ratio.fact_percent, 70);
        assert_eq!(config.history_retention_days, 30);
        assert_eq!(config.tier_limits.free.max_items_per_slot, 3);
    }

    #[test]
    fn ratio_not_summing_to_100_is_rejected() {
        let err = FeedConfig::from_toml_str(
            "[default_ratio]\nfact_percent = 70\nquestion_percent = 20\n",
        )
        .expect_err("bad ratio must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let err = FeedConfig::from_toml_str("utc_offset_minutes = 2000\n")
            .expect_err("offset beyond 14h must fail");
        assert!(err.to_string().contains("utc_offset_minutes"));
    }

    #[test]
    fn expired_trial_gets_free_limits() {
        let limits = FeedConfig::default().tier_limits;
        assert_eq!(
            limits.for_tier(SubscriptionTier::Trial, false).max_items_per_slot,
            3
        );
        assert_eq!(
            limits.for_tier(SubscriptionTier::Trial, true).max_items_per_slot,
            10
        );
        assert_eq!(
            limits
                .for_tier(SubscriptionTier::Premium, true)
                .max_notification_times,
            None
        );
    }
}
