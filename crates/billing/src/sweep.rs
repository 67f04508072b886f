//! Expiration sweep
//!
//! Periodic, idempotent job over subscriptions whose period has lapsed.
//! Revocation always happens before any re-billing attempt, and a
//! failed renewal request marks the row expired: the sweep fails toward
//! de-entitlement, never toward silent re-entitlement. Per-row errors
//! accumulate into the report; the batch never aborts on first failure.
//!
//! Overdue payments do not revoke entitlement on their own; the grace
//! window a lapsed subscriber enjoys equals this job's run interval
//! (`SWEEP_CRON` in the worker).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use galeria_shared::SubscriptionStatus;

use crate::client::{CreatePaymentParams, GatewayClient};
use crate::entitlement::EntitlementService;
use crate::error::BillingResult;
use crate::subscriptions::{Subscription, SubscriptionService};

/// Days until a sweep-issued renewal charge is due.
const RENEWAL_DUE_DAYS: i64 = 30;

/// Outbound notification hook for subscriptions about to expire.
/// Delivery itself (email, push) is an external collaborator.
#[async_trait]
pub trait ExpiryNotifier: Send + Sync {
    async fn notify_expiring(
        &self,
        user_id: Uuid,
        tier: &str,
        period_end: OffsetDateTime,
    ) -> Result<(), String>;
}

/// Default notifier: logs and does nothing else.
pub struct NoopNotifier;

#[async_trait]
impl ExpiryNotifier for NoopNotifier {
    async fn notify_expiring(
        &self,
        user_id: Uuid,
        tier: &str,
        period_end: OffsetDateTime,
    ) -> Result<(), String> {
        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            period_end = %period_end,
            "Subscription expiring tomorrow (no notifier configured)"
        );
        Ok(())
    }
}

/// Aggregated result of one sweep run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Rows examined.
    pub processed: u32,
    /// Rows de-entitled and marked expired.
    pub blocked: u32,
    /// Rows suspended with a fresh renewal charge attached.
    pub renewed: u32,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct SweepService {
    pool: PgPool,
    gateway: GatewayClient,
    subscriptions: SubscriptionService,
    entitlement: EntitlementService,
    notifier: Arc<dyn ExpiryNotifier>,
}

impl SweepService {
    pub fn new(pool: PgPool, gateway: GatewayClient, notifier: Arc<dyn ExpiryNotifier>) -> Self {
        let subscriptions = SubscriptionService::new(pool.clone());
        let entitlement = EntitlementService::new(pool.clone());
        Self {
            pool,
            gateway,
            subscriptions,
            entitlement,
            notifier,
        }
    }

    /// Expire lapsed subscriptions, optionally issuing a renewal charge.
    pub async fn run_expiration(&self) -> BillingResult<SweepReport> {
        let lapsed: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active' AND period_end < NOW()
            ORDER BY period_end ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut report = SweepReport::default();

        for row in lapsed {
            report.processed += 1;
            if let Err(e) = self.expire_one(&row, &mut report).await {
                tracing::error!(
                    subscription_id = %row.id,
                    user_id = %row.user_id,
                    error = %e,
                    "Sweep failed for subscription"
                );
                report.errors.push(format!("{}: {e}", row.id));
            }
        }

        tracing::info!(
            processed = report.processed,
            blocked = report.blocked,
            renewed = report.renewed,
            errors = report.errors.len(),
            "Expiration sweep complete"
        );

        Ok(report)
    }

    async fn expire_one(&self, row: &Subscription, report: &mut SweepReport) -> BillingResult<()> {
        // Re-fetch immediately before the write decision: a renewal
        // landing mid-sweep moves period_end forward and this row is
        // simply skipped.
        let Some(current) = self.subscriptions.find_active(row.user_id).await? else {
            return Ok(());
        };
        if current.id != row.id || current.period_end >= OffsetDateTime::now_utc() {
            return Ok(());
        }

        // Revoke first. The row is still active but its period has
        // lapsed, so the projection comes out false.
        self.entitlement.project(current.user_id).await?;

        let renewable = current.auto_renew && current.gateway_customer_id.is_some();
        if !renewable {
            self.subscriptions.mark_expired(current.id).await?;
            report.blocked += 1;
            return Ok(());
        }

        match self.issue_renewal_charge(&current).await {
            Ok(payment_id) => {
                self.subscriptions
                    .mark_suspended(current.id, &payment_id)
                    .await?;
                report.renewed += 1;
                tracing::info!(
                    subscription_id = %current.id,
                    user_id = %current.user_id,
                    payment_id = %payment_id,
                    "Renewal charge issued, subscription suspended pending payment"
                );
            }
            Err(e) => {
                // Fail-safe toward de-entitlement: a charge we could not
                // issue must not leave the row looking renewable.
                self.subscriptions.mark_expired(current.id).await?;
                report.blocked += 1;
                report.errors.push(format!(
                    "{}: renewal charge failed: {e}",
                    current.id
                ));
            }
        }

        Ok(())
    }

    async fn issue_renewal_charge(&self, row: &Subscription) -> BillingResult<String> {
        let tier = row.tier().ok_or_else(|| {
            crate::error::BillingError::ReconciliationConflict(format!(
                "subscription {} has unknown tier {}",
                row.id, row.tier
            ))
        })?;
        // Guarded by `renewable` in the caller.
        let customer_id = row.gateway_customer_id.clone().unwrap_or_default();

        let due = OffsetDateTime::now_utc() + Duration::days(RENEWAL_DUE_DAYS);

        // Card subscriptions renew on the gateway's own recurring
        // engine; sweep-issued renewals are one-off PIX charges tied to
        // the internal subscription row.
        let payment = self
            .gateway
            .create_payment(&CreatePaymentParams {
                customer_id,
                user_id: row.user_id,
                tier,
                amount_cents: row.amount_cents,
                method: galeria_shared::PaymentMethod::Pix,
                due_date: format_due_date(due),
                description: format!("Renovacao assinatura {tier}"),
            })
            .await?;

        Ok(payment.id)
    }

    /// Read-only scan for subscriptions expiring exactly one day ahead;
    /// fires the injected notifier per row.
    pub async fn run_expiry_notices(&self) -> BillingResult<SweepReport> {
        let expiring: Vec<Subscription> = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active'
              AND period_end >= NOW() + INTERVAL '1 day'
              AND period_end < NOW() + INTERVAL '2 days'
            ORDER BY period_end ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut report = SweepReport::default();

        for row in expiring {
            report.processed += 1;
            if row.status() != Some(SubscriptionStatus::Active) {
                continue;
            }
            if let Err(e) = self
                .notifier
                .notify_expiring(row.user_id, &row.tier, row.period_end)
                .await
            {
                report.errors.push(format!("{}: notify failed: {e}", row.id));
            }
        }

        tracing::info!(
            processed = report.processed,
            errors = report.errors.len(),
            "Expiry notice sweep complete"
        );

        Ok(report)
    }
}

fn format_due_date(ts: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day()
    )
}
