//! User account projection read by the feed engine.
//!
//! The account store is owned by the profile/subscription layer; core only
//! reads the creation instant and subscription window from it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable user identifier.
pub type UserId = Uuid;

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Premium,
    Trial,
}

impl SubscriptionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Trial => "trial",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            "trial" => Ok(Self::Trial),
            other => Err(format!("unknown subscription tier `{other}`")),
        }
    }
}

impl Display for SubscriptionTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account fields relevant to scheduling and history retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    /// Unix epoch milliseconds of registration.
    pub created_at: i64,
    pub tier: SubscriptionTier,
    /// Unix epoch milliseconds. Lower bound for history reads when set.
    pub subscription_started_at: Option<i64>,
    /// Unix epoch milliseconds. `None` means no expiry.
    pub subscription_expires_at: Option<i64>,
}

impl UserAccount {
    /// Creates a free-tier account registered at `created_at`.
    pub fn new(user_id: UserId, created_at: i64) -> Self {
        Self {
            user_id,
            created_at,
            tier: SubscriptionTier::Free,
            subscription_started_at: None,
            subscription_expires_at: None,
        }
    }

    /// Returns whether premium features apply at `now_ms`.
    ///
    /// Premium and trial tiers qualify until their expiry, if any.
    pub fn is_premium_capable(&self, now_ms: i64) -> bool {
        match self.tier {
            SubscriptionTier::Free => false,
            SubscriptionTier::Premium | SubscriptionTier::Trial => self
                .subscription_expires_at
                .map_or(true, |expires_at| expires_at > now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SubscriptionTier, UserAccount};
    use uuid::Uuid;

    #[test]
    fn trial_expires_and_free_never_qualifies() {
        let mut account = UserAccount::new(Uuid::new_v4(), 0);
        assert!(!account.is_premium_capable(10));

        account.tier = SubscriptionTier::Trial;
        account.subscription_expires_at = Some(100);
        assert!(account.is_premium_capable(99));
        assert!(!account.is_premium_capable(100));

        account.tier = SubscriptionTier::Premium;
        account.subscription_expires_at = None;
        assert!(account.is_premium_capable(i64::MAX));
    }
}
