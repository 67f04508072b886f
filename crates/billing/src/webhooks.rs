//! Payment event processing
//!
//! Consumes gateway webhook callbacks, updates the transaction ledger
//! and drives subscription lifecycle transitions. Processing is
//! idempotent: the ledger upsert is keyed on the external payment id
//! and the subscription renewal recognizes an already-applied payment,
//! so the same payload may be delivered any number of times.
//!
//! The reconciliation poller feeds a directly-fetched payment snapshot
//! through [`WebhookHandler::apply_payment`], so there is exactly one
//! reconciliation algorithm regardless of trigger.

use sqlx::PgPool;
use uuid::Uuid;

use galeria_shared::{SubscriptionTier, TransactionStatus};

use crate::client::{GatewaySubscription, PaymentSnapshot};
use crate::entitlement::EntitlementService;
use crate::error::BillingResult;
use crate::events::{resolve_tier, resolve_user_reference, EventKind, GatewayEvent};
use crate::ledger::{LedgerService, NewTransaction};
use crate::subscriptions::{RenewOrCreate, SubscriptionService};

/// What a processing pass actually did. Returned for logging and to let
/// tests assert on the branch taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Confirmed payment: ledger paid, subscription renewed/created,
    /// entitlement projected.
    Confirmed { user_id: Uuid, payment_id: String },
    /// Ledger-only update (pending/overdue/cancelled). Entitlement is
    /// untouched; revocation for lapsed periods is the sweep's job.
    Recorded {
        user_id: Uuid,
        payment_id: String,
        status: TransactionStatus,
    },
    /// Gateway deleted the recurring subscription; entitlement revoked.
    Canceled { user_id: Uuid },
    /// Plan change applied to subscription and profile projection.
    TierChanged {
        user_id: Uuid,
        tier: SubscriptionTier,
    },
    /// Callback could not be tied to local state; logged and dropped.
    Skipped { reason: String },
    /// Event kind this engine does not react to.
    Ignored { event: String },
}

/// Webhook handler for gateway events.
#[derive(Clone)]
pub struct WebhookHandler {
    pool: PgPool,
    ledger: LedgerService,
    subscriptions: SubscriptionService,
    entitlement: EntitlementService,
}

impl WebhookHandler {
    pub fn new(pool: PgPool) -> Self {
        let ledger = LedgerService::new(pool.clone());
        let subscriptions = SubscriptionService::new(pool.clone());
        let entitlement = EntitlementService::new(pool.clone());
        Self {
            pool,
            ledger,
            subscriptions,
            entitlement,
        }
    }

    /// Handle a parsed gateway callback.
    ///
    /// A callback for an unknown customer is logged and skipped, never
    /// an error: failing loudly would push the gateway into a retry
    /// loop it can't win.
    pub async fn handle_event(&self, event: GatewayEvent) -> BillingResult<Processed> {
        tracing::info!(event = %event.event, "Processing gateway event");

        match &event.event {
            EventKind::PaymentConfirmed => {
                self.with_payment(&event, TransactionStatus::Paid).await
            }
            EventKind::PaymentReceived => {
                self.with_payment(&event, TransactionStatus::Pending).await
            }
            EventKind::PaymentOverdue => {
                self.with_payment(&event, TransactionStatus::Overdue).await
            }
            EventKind::PaymentDeleted => {
                self.with_payment(&event, TransactionStatus::Cancelled)
                    .await
            }
            EventKind::SubscriptionDeleted => match &event.subscription {
                Some(sub) => self.handle_subscription_deleted(sub).await,
                None => Ok(skipped("subscription event without subscription payload")),
            },
            EventKind::SubscriptionUpdated => match &event.subscription {
                Some(sub) => self.handle_subscription_updated(sub).await,
                None => Ok(skipped("subscription event without subscription payload")),
            },
            EventKind::Other(kind) => {
                // Log at info so new gateway event kinds show up in
                // traffic before anyone writes a handler for them.
                tracing::info!(event = %kind, "Unhandled gateway event kind");
                Ok(Processed::Ignored {
                    event: kind.clone(),
                })
            }
        }
    }

    async fn with_payment(
        &self,
        event: &GatewayEvent,
        status: TransactionStatus,
    ) -> BillingResult<Processed> {
        match &event.payment {
            Some(payment) => self.apply_payment(payment, status).await,
            None => Ok(skipped("payment event without payment payload")),
        }
    }

    /// The single reconciliation algorithm.
    ///
    /// Shared verbatim by the webhook branches above and by the
    /// reconciliation poller, which derives `status` from the snapshot
    /// it fetched. The ledger merge keeps the whole thing
    /// order-independent: a stale `pending` arriving after `paid` is a
    /// no-op.
    pub async fn apply_payment(
        &self,
        payment: &PaymentSnapshot,
        status: TransactionStatus,
    ) -> BillingResult<Processed> {
        let Some(user_id) = self.resolve_user(payment).await? else {
            tracing::warn!(
                payment_id = %payment.id,
                customer = %payment.customer,
                "Gateway payment for unknown customer, skipping"
            );
            return Ok(skipped("unresolvable customer"));
        };

        let tier = resolve_tier(
            payment.external_reference.as_deref(),
            payment.description.as_deref(),
        )
        .unwrap_or_else(|warning| {
            tracing::warn!(
                payment_id = %payment.id,
                reference = ?payment.external_reference,
                description = ?payment.description,
                assumed = %warning.assumed,
                reason = %warning.reason,
                "Tier resolution fell back to default"
            );
            warning.assumed
        });

        let row = self
            .ledger
            .upsert(&NewTransaction {
                gateway_payment_id: payment.id.clone(),
                user_id,
                tier,
                gross_cents: payment.gross_cents(),
                fee_cents: payment.fee_cents(),
                net_cents: payment.net_cents(),
                method: payment.billing_type,
                status,
            })
            .await?;

        if status != TransactionStatus::Paid {
            // Only confirmed payments grant entitlement. An overdue
            // charge does not immediately revoke it either; that is the
            // expiration sweep's job on its next run.
            return Ok(Processed::Recorded {
                user_id,
                status: row.status().unwrap_or(status),
                payment_id: row.gateway_payment_id,
            });
        }

        self.subscriptions
            .renew_or_create(&RenewOrCreate {
                user_id,
                tier,
                payment_id: payment.id.clone(),
                amount_cents: payment.gross_cents(),
                method: payment.billing_type,
                gateway_customer_id: Some(payment.customer.clone()),
            })
            .await?;

        let entitlement = self.entitlement.project(user_id).await?;

        tracing::info!(
            user_id = %user_id,
            payment_id = %payment.id,
            tier = %tier,
            is_premium = entitlement.is_premium,
            "Payment confirmed and entitlement projected"
        );

        Ok(Processed::Confirmed {
            user_id,
            payment_id: payment.id.clone(),
        })
    }

    async fn handle_subscription_deleted(
        &self,
        sub: &GatewaySubscription,
    ) -> BillingResult<Processed> {
        let Some(user_id) = self
            .resolve_customer(&sub.customer, sub.external_reference.as_deref())
            .await?
        else {
            tracing::warn!(
                subscription_id = %sub.id,
                customer = %sub.customer,
                "Subscription deletion for unknown customer, skipping"
            );
            return Ok(skipped("unresolvable customer"));
        };

        // Deletion revokes entitlement immediately, unlike overdue.
        if let Some(row) = self.subscriptions.find_active(user_id).await? {
            self.subscriptions.mark_canceled(row.id).await?;
        }
        self.entitlement.project(user_id).await?;

        tracing::info!(user_id = %user_id, "Subscription canceled by gateway");
        Ok(Processed::Canceled { user_id })
    }

    async fn handle_subscription_updated(
        &self,
        sub: &GatewaySubscription,
    ) -> BillingResult<Processed> {
        let Some(user_id) = self
            .resolve_customer(&sub.customer, sub.external_reference.as_deref())
            .await?
        else {
            return Ok(skipped("unresolvable customer"));
        };

        let tier = resolve_tier(sub.external_reference.as_deref(), sub.description.as_deref())
            .unwrap_or_else(|warning| {
                tracing::warn!(
                    subscription_id = %sub.id,
                    assumed = %warning.assumed,
                    reason = %warning.reason,
                    "Tier resolution fell back to default on plan change"
                );
                warning.assumed
            });

        // Plan changes move the tier only; the period dates stay.
        if let Some(row) = self.subscriptions.find_current(user_id).await? {
            self.subscriptions.update_tier(row.id, tier).await?;
        }
        self.entitlement.project(user_id).await?;

        tracing::info!(user_id = %user_id, tier = %tier, "Subscription tier updated");
        Ok(Processed::TierChanged { user_id, tier })
    }

    /// Resolve the owning user: gateway customer id first, then the
    /// uuid embedded in the structured external reference.
    async fn resolve_user(&self, payment: &PaymentSnapshot) -> BillingResult<Option<Uuid>> {
        self.resolve_customer(&payment.customer, payment.external_reference.as_deref())
            .await
    }

    async fn resolve_customer(
        &self,
        gateway_customer_id: &str,
        reference: Option<&str>,
    ) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE gateway_customer_id = $1")
                .bind(gateway_customer_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((id,)) = row {
            return Ok(Some(id));
        }

        let Some(user_id) = resolve_user_reference(reference) else {
            return Ok(None);
        };

        // Reference names a user we know: adopt the customer id so the
        // next callback resolves directly.
        let exists: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE users SET gateway_customer_id = COALESCE(gateway_customer_id, $2)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(gateway_customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(exists.map(|(id,)| id))
    }
}

fn skipped(reason: &str) -> Processed {
    Processed::Skipped {
        reason: reason.to_string(),
    }
}
