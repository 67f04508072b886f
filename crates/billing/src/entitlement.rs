//! Entitlement projection
//!
//! The only writer of `users.is_premium` and `users.subscription_tier`.
//! Both columns are a pure function of the subscription store and are
//! recomputed after every lifecycle transition, never hand-edited.

use sqlx::PgPool;
use uuid::Uuid;

use galeria_shared::SubscriptionTier;

use crate::error::BillingResult;

/// Projected entitlement state as written to the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Entitlement {
    pub is_premium: bool,
    pub tier: Option<SubscriptionTier>,
}

impl Entitlement {
    pub fn none() -> Self {
        Self {
            is_premium: false,
            tier: None,
        }
    }
}

#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recompute and persist the user's entitlement.
    ///
    /// `is_premium` is true iff an `active` subscription row exists with
    /// `period_end` not yet past. Safe to call redundantly; concurrent
    /// calls converge because the write is derived from a fresh read.
    pub async fn project(&self, user_id: Uuid) -> BillingResult<Entitlement> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT tier FROM subscriptions
            WHERE user_id = $1 AND status = 'active' AND period_end >= NOW()
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let entitlement = match row.and_then(|(t,)| SubscriptionTier::parse(&t)) {
            Some(tier) => Entitlement {
                is_premium: true,
                tier: Some(tier),
            },
            None => Entitlement::none(),
        };

        sqlx::query(
            r#"
            UPDATE users SET is_premium = $2, subscription_tier = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(entitlement.is_premium)
        .bind(entitlement.tier.map(|t| t.as_str()))
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            is_premium = entitlement.is_premium,
            tier = ?entitlement.tier,
            "Entitlement projected"
        );

        Ok(entitlement)
    }

    /// Read the currently projected entitlement without recomputing.
    pub async fn current(&self, user_id: Uuid) -> BillingResult<Entitlement> {
        let row: Option<(bool, Option<String>)> =
            sqlx::query_as("SELECT is_premium, subscription_tier FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((is_premium, tier)) => Entitlement {
                is_premium,
                tier: tier.as_deref().and_then(SubscriptionTier::parse),
            },
            None => Entitlement::none(),
        })
    }
}
