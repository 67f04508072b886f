//! Subscription lifecycle management
//!
//! Owns the entitlement period state machine:
//! `none -> active -> {suspended, expired, canceled}`,
//! `suspended -> {active, expired}`. Terminal states are re-entered only
//! via a brand-new active row.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use galeria_shared::{PaymentMethod, SubscriptionStatus, SubscriptionTier};

use crate::error::{BillingError, BillingResult};

/// Fixed entitlement window granted per confirmed payment, measured
/// from the moment of confirmation. Early renewal does not stack time;
/// paying 10 days before period end still yields now+30.
pub const RENEWAL_PERIOD_DAYS: i64 = 30;

/// Compute the period granted by a payment confirmed at `now`.
pub fn renewal_period(now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    (now, now + Duration::days(RENEWAL_PERIOD_DAYS))
}

/// Tracked entitlement period for a user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: String,
    pub status: String,
    pub amount_cents: i64,
    pub billing_cycle: String,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub last_payment_id: Option<String>,
    pub auto_renew: bool,
    pub gateway_customer_id: Option<String>,
    pub canceled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::parse(&self.status)
    }

    pub fn tier(&self) -> Option<SubscriptionTier> {
        SubscriptionTier::parse(&self.tier)
    }
}

/// Arguments for the renew-or-create operation.
#[derive(Debug, Clone)]
pub struct RenewOrCreate {
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    pub payment_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub gateway_customer_id: Option<String>,
}

/// Create/renew/suspend/expire/cancel operations on the subscription
/// store. Every mutation is guarded by the current status in the WHERE
/// clause (read-then-write), so a concurrent transition loses cleanly
/// instead of clobbering.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a confirmed payment: extend the existing period or open a
    /// new one.
    ///
    /// An `active` row is reset in place (period restarted from now); a
    /// `suspended` row recovers to `active` the same way. With neither
    /// present a fresh row is inserted. Idempotent for a duplicated
    /// confirmation: the second application keeps the window the first
    /// one derived from the same payment id.
    pub async fn renew_or_create(&self, params: &RenewOrCreate) -> BillingResult<Subscription> {
        let now = OffsetDateTime::now_utc();
        let (period_start, period_end) = renewal_period(now);

        // Re-applying the exact payment that already renewed this row is
        // a duplicate delivery; keep the first window instead of sliding
        // it forward on every retry.
        if let Some(current) = self.find_current(params.user_id).await? {
            if current.status() == Some(SubscriptionStatus::Active)
                && current.last_payment_id.as_deref() == Some(params.payment_id.as_str())
            {
                return Ok(current);
            }
        }

        let renewed: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                tier = $2,
                status = 'active',
                amount_cents = $3,
                period_start = $4,
                period_end = $5,
                last_payment_id = $6,
                gateway_customer_id = COALESCE($7, gateway_customer_id),
                canceled_at = NULL,
                updated_at = NOW()
            WHERE user_id = $1 AND status IN ('active', 'suspended')
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.tier.as_str())
        .bind(params.amount_cents)
        .bind(period_start)
        .bind(period_end)
        .bind(&params.payment_id)
        .bind(params.gateway_customer_id.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = renewed {
            tracing::info!(
                user_id = %params.user_id,
                subscription_id = %row.id,
                period_end = %row.period_end,
                "Subscription renewed"
            );
            return Ok(row);
        }

        let inserted: Result<Subscription, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO subscriptions
                (user_id, tier, status, amount_cents, billing_cycle,
                 period_start, period_end, last_payment_id, auto_renew, gateway_customer_id)
            VALUES ($1, $2, 'active', $3, 'monthly', $4, $5, $6, TRUE, $7)
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.tier.as_str())
        .bind(params.amount_cents)
        .bind(period_start)
        .bind(period_end)
        .bind(&params.payment_id)
        .bind(params.gateway_customer_id.as_deref())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => {
                tracing::info!(
                    user_id = %params.user_id,
                    subscription_id = %row.id,
                    tier = %row.tier,
                    "Subscription created"
                );
                Ok(row)
            }
            // Unique violation on the one-active-per-user index means a
            // concurrent confirmation inserted first; converge by
            // renewing the row it created.
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(
                    user_id = %params.user_id,
                    "Concurrent subscription insert detected, renewing existing row"
                );
                let row: Subscription = sqlx::query_as(
                    r#"
                    UPDATE subscriptions SET
                        tier = $2,
                        status = 'active',
                        amount_cents = $3,
                        period_start = $4,
                        period_end = $5,
                        last_payment_id = $6,
                        canceled_at = NULL,
                        updated_at = NOW()
                    WHERE user_id = $1 AND status = 'active'
                    RETURNING *
                    "#,
                )
                .bind(params.user_id)
                .bind(params.tier.as_str())
                .bind(params.amount_cents)
                .bind(period_start)
                .bind(period_end)
                .bind(&params.payment_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(row)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Suspend an active row pending confirmation of a renewal charge
    /// the sweep just issued.
    pub async fn mark_suspended(
        &self,
        subscription_id: Uuid,
        new_payment_id: &str,
    ) -> BillingResult<Subscription> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = 'suspended',
                last_payment_id = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(new_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::NotFound(format!("active subscription {subscription_id}"))
        })
    }

    /// Terminal: period lapsed with no renewal in flight. The caller
    /// must re-project entitlement afterwards.
    pub async fn mark_expired(&self, subscription_id: Uuid) -> BillingResult<Subscription> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET status = 'expired', updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'suspended')
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::NotFound(format!("non-terminal subscription {subscription_id}"))
        })
    }

    /// Terminal: the gateway reported subscription deletion. The caller
    /// must re-project entitlement afterwards.
    pub async fn mark_canceled(&self, subscription_id: Uuid) -> BillingResult<Subscription> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = 'canceled',
                canceled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::NotFound(format!("active subscription {subscription_id}"))
        })
    }

    /// Plan change reported by the gateway: tier and amount move, the
    /// period dates stay untouched.
    pub async fn update_tier(
        &self,
        subscription_id: Uuid,
        tier: SubscriptionTier,
    ) -> BillingResult<Subscription> {
        let row: Option<Subscription> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                tier = $2,
                amount_cents = $3,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'suspended')
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(tier.as_str())
        .bind(tier.monthly_price_cents())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| {
            BillingError::NotFound(format!("non-terminal subscription {subscription_id}"))
        })
    }

    pub async fn find_active(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// The row currently representing the user's entitlement: active or
    /// suspended, most recently updated.
    pub async fn find_current(&self, user_id: Uuid) -> BillingResult<Option<Subscription>> {
        let row = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1 AND status IN ('active', 'suspended')
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn renewal_window_is_thirty_days_from_now() {
        let now = datetime!(2026-08-30 12:00 UTC);
        let (start, end) = renewal_period(now);
        assert_eq!(start, now);
        assert_eq!(end, datetime!(2026-09-29 12:00 UTC));
    }

    #[test]
    fn early_renewal_does_not_stack() {
        // A user 10 days from period end renews today: the new window is
        // still now+30, not old_end+30.
        let now = datetime!(2026-08-30 08:00 UTC);
        let old_period_end = datetime!(2026-09-09 08:00 UTC);
        let (_, new_end) = renewal_period(now);
        assert_eq!(new_end, datetime!(2026-09-29 08:00 UTC));
        assert!(new_end < old_period_end + Duration::days(RENEWAL_PERIOD_DAYS));
    }
}
