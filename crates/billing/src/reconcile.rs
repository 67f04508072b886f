//! Manual payment reconciliation
//!
//! Webhook delivery is not guaranteed. This is the self-healing path an
//! operator (or a client staring at a stuck PIX charge) can trigger: it
//! fetches the payment's current state straight from the gateway and
//! feeds it through the exact same branches as the webhook processor.

use serde::Serialize;

use crate::client::GatewayClient;
use crate::entitlement::EntitlementService;
use crate::error::{BillingError, BillingResult};
use crate::webhooks::{Processed, WebhookHandler};

/// Result of a reconciliation pass, returned to the caller so they can
/// see what state the payment and entitlement landed in.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub payment_id: String,
    /// Raw status as the gateway reported it.
    pub gateway_status: String,
    /// Branch the reconciliation took (for operator visibility).
    pub processed: String,
    pub is_premium: bool,
}

#[derive(Clone)]
pub struct ReconciliationService {
    gateway: GatewayClient,
    webhooks: WebhookHandler,
    entitlement: EntitlementService,
}

impl ReconciliationService {
    pub fn new(
        gateway: GatewayClient,
        webhooks: WebhookHandler,
        entitlement: EntitlementService,
    ) -> Self {
        Self {
            gateway,
            webhooks,
            entitlement,
        }
    }

    /// Fetch a payment from the gateway and reconcile local state with
    /// it. Gateway failures propagate: this operation moves money state
    /// and must never silently report success.
    pub async fn reconcile_payment(&self, payment_id: &str) -> BillingResult<ReconcileOutcome> {
        let payment = self.gateway.get_payment(payment_id).await?;

        let Some(status) = payment.ledger_status() else {
            tracing::warn!(
                payment_id = %payment.id,
                gateway_status = %payment.status,
                "Gateway reported a status this engine does not map; leaving state untouched"
            );
            return Err(BillingError::ReconciliationConflict(format!(
                "unmapped gateway status {}",
                payment.status
            )));
        };

        let processed = self.webhooks.apply_payment(&payment, status).await?;

        let is_premium = match &processed {
            Processed::Confirmed { user_id, .. }
            | Processed::Recorded { user_id, .. }
            | Processed::Canceled { user_id }
            | Processed::TierChanged { user_id, .. } => {
                self.entitlement.current(*user_id).await?.is_premium
            }
            Processed::Skipped { .. } | Processed::Ignored { .. } => false,
        };

        tracing::info!(
            payment_id = %payment.id,
            gateway_status = %payment.status,
            processed = ?processed,
            "Manual reconciliation complete"
        );

        Ok(ReconcileOutcome {
            payment_id: payment.id,
            gateway_status: payment.status,
            processed: describe(&processed),
            is_premium,
        })
    }
}

fn describe(processed: &Processed) -> String {
    match processed {
        Processed::Confirmed { .. } => "confirmed".to_string(),
        Processed::Recorded { status, .. } => format!("recorded:{status}"),
        Processed::Canceled { .. } => "canceled".to_string(),
        Processed::TierChanged { tier, .. } => format!("tier_changed:{tier}"),
        Processed::Skipped { reason } => format!("skipped:{reason}"),
        Processed::Ignored { event } => format!("ignored:{event}"),
    }
}
