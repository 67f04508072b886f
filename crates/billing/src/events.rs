//! Gateway event model and tier resolution
//!
//! Webhook payloads arrive as `{event, payment?, subscription?}`. The
//! event kind is a tagged enum with an `Other` catch-all so unknown
//! events are observable in logs instead of failing deserialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use galeria_shared::SubscriptionTier;

use crate::client::{GatewaySubscription, PaymentSnapshot};

/// Event kinds the processor reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "PAYMENT_CONFIRMED")]
    PaymentConfirmed,
    #[serde(rename = "PAYMENT_RECEIVED")]
    PaymentReceived,
    #[serde(rename = "PAYMENT_OVERDUE")]
    PaymentOverdue,
    #[serde(rename = "PAYMENT_DELETED")]
    PaymentDeleted,
    #[serde(rename = "SUBSCRIPTION_DELETED")]
    SubscriptionDeleted,
    #[serde(rename = "SUBSCRIPTION_UPDATED")]
    SubscriptionUpdated,
    #[serde(untagged)]
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PaymentConfirmed => "PAYMENT_CONFIRMED",
            EventKind::PaymentReceived => "PAYMENT_RECEIVED",
            EventKind::PaymentOverdue => "PAYMENT_OVERDUE",
            EventKind::PaymentDeleted => "PAYMENT_DELETED",
            EventKind::SubscriptionDeleted => "SUBSCRIPTION_DELETED",
            EventKind::SubscriptionUpdated => "SUBSCRIPTION_UPDATED",
            EventKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A gateway webhook callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event: EventKind,
    #[serde(default)]
    pub payment: Option<PaymentSnapshot>,
    #[serde(default)]
    pub subscription: Option<GatewaySubscription>,
}

/// Structured reference attached to every write the engine issues:
/// `premium:{tier}:{user_id}`. Downstream reconciliation recovers both
/// the tier and the owning user from it even without local state.
pub fn payment_reference(tier: SubscriptionTier, user_id: Uuid) -> String {
    format!("premium:{}:{}", tier.as_str(), user_id)
}

/// Tier could not be resolved from structured data; `assumed` is the
/// default the caller applies after logging the warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionWarning {
    pub assumed: SubscriptionTier,
    pub reason: String,
}

/// Tier the engine falls back to when an event carries no usable
/// reference or description. Lowest paid tier: under-granting beats
/// over-granting.
pub const DEFAULT_ASSUMED_TIER: SubscriptionTier = SubscriptionTier::Lite;

/// Resolve the tier for a payment event.
///
/// Ordered fallback chain, because the gateway does not guarantee a
/// structured reference on every event kind:
/// 1. `premium:{tier}:{user}` external reference
/// 2. tier name appearing in the free-text description
/// 3. `Err(ResolutionWarning)` carrying the assumed default
pub fn resolve_tier(
    reference: Option<&str>,
    description: Option<&str>,
) -> Result<SubscriptionTier, ResolutionWarning> {
    if let Some(reference) = reference {
        if let Some(tier) = tier_from_reference(reference) {
            return Ok(tier);
        }
    }

    if let Some(description) = description {
        let lower = description.to_lowercase();
        // Whole words only: "Compra de produto" must not resolve to
        // pro. Scan from the highest tier down so a description naming
        // two tiers resolves to the higher one.
        for tier in SubscriptionTier::paid_tiers().iter().rev() {
            if lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == tier.as_str())
            {
                return Ok(*tier);
            }
        }
    }

    Err(ResolutionWarning {
        assumed: DEFAULT_ASSUMED_TIER,
        reason: format!(
            "no tier in reference={reference:?} or description={description:?}"
        ),
    })
}

/// Extract the owning user id from a structured reference, if present.
pub fn resolve_user_reference(reference: Option<&str>) -> Option<Uuid> {
    let reference = reference?;
    let mut parts = reference.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("premium"), Some(_tier), Some(user)) => Uuid::parse_str(user).ok(),
        _ => None,
    }
}

fn tier_from_reference(reference: &str) -> Option<SubscriptionTier> {
    let mut parts = reference.splitn(3, ':');
    match (parts.next(), parts.next()) {
        (Some("premium"), Some(tier)) => SubscriptionTier::parse(tier),
        _ => None,
    }
}
