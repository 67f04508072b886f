//! Subscription tiers and their limits

use serde::{Deserialize, Serialize};

/// Subscription tier on the storefront
///
/// Ordered from free upward. The tier drives both the daily download
/// quota and the monthly price charged for renewals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Lite,
    Pro,
    Plus,
    Ultra,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Lite => "lite",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Plus => "plus",
            SubscriptionTier::Ultra => "ultra",
        }
    }

    /// Parse a lowercase tier name. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(SubscriptionTier::Free),
            "lite" => Some(SubscriptionTier::Lite),
            "pro" => Some(SubscriptionTier::Pro),
            "plus" => Some(SubscriptionTier::Plus),
            "ultra" => Some(SubscriptionTier::Ultra),
            _ => None,
        }
    }

    /// All tiers that can be purchased (everything except Free).
    pub fn paid_tiers() -> &'static [SubscriptionTier] {
        &[
            SubscriptionTier::Lite,
            SubscriptionTier::Pro,
            SubscriptionTier::Plus,
            SubscriptionTier::Ultra,
        ]
    }

    /// Distinct resources a user on this tier may download per
    /// reference-timezone calendar day.
    pub fn daily_download_limit(&self) -> i64 {
        match self {
            SubscriptionTier::Free => 1,
            SubscriptionTier::Lite => 3,
            SubscriptionTier::Pro => 10,
            SubscriptionTier::Plus | SubscriptionTier::Ultra => 20,
        }
    }

    /// Monthly price in cents charged on renewal.
    pub fn monthly_price_cents(&self) -> i64 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Lite => 990,
            SubscriptionTier::Pro => 2990,
            SubscriptionTier::Plus => 4990,
            SubscriptionTier::Ultra => 9990,
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, SubscriptionTier::Free)
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
