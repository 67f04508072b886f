//! Premium checkout
//!
//! Card capture is synchronous on the gateway, so a card checkout
//! grants entitlement immediately. PIX and boleto checkouts issue a
//! one-off charge and leave entitlement untouched until the payment
//! confirmation comes back through the event processor.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use galeria_shared::{BillingCycle, PaymentMethod, SubscriptionTier};

use crate::client::{
    CardToken, CreatePaymentParams, CreateSubscriptionParams, GatewayClient, GatewaySubscription,
    PixQr,
};
use crate::customer::CustomerService;
use crate::entitlement::EntitlementService;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::{RenewOrCreate, SubscriptionService};

/// Days until a PIX/boleto checkout charge is due.
const CHECKOUT_DUE_DAYS: i64 = 3;

/// Checkout request as received from the storefront.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub tier: SubscriptionTier,
    pub method: PaymentMethod,
    #[serde(default)]
    pub billing_cycle: Option<BillingCycle>,
    #[serde(default)]
    pub card: Option<CardToken>,
}

/// What the buyer gets back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum CheckoutOutcome {
    /// Card: recurring subscription created, premium active now.
    Subscription {
        subscription: GatewaySubscription,
        is_premium: bool,
    },
    /// PIX: charge issued, buyer pays via QR / copy-paste code.
    PixCharge {
        payment_id: String,
        qr_code: String,
        copy_paste_code: String,
    },
    /// Boleto: charge issued, buyer pays the slip.
    BoletoCharge {
        payment_id: String,
        boleto_url: String,
    },
}

#[derive(Clone)]
pub struct CheckoutService {
    gateway: GatewayClient,
    customers: CustomerService,
    subscriptions: SubscriptionService,
    entitlement: EntitlementService,
}

impl CheckoutService {
    pub fn new(gateway: GatewayClient, pool: PgPool) -> Self {
        let customers = CustomerService::new(gateway.clone(), pool.clone());
        let subscriptions = SubscriptionService::new(pool.clone());
        let entitlement = EntitlementService::new(pool);
        Self {
            gateway,
            customers,
            subscriptions,
            entitlement,
        }
    }

    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutOutcome> {
        validate(request)?;

        let customer_id = self.customers.ensure_customer(user_id).await?;
        let tier = request.tier;
        let amount_cents = tier.monthly_price_cents();

        match request.method {
            PaymentMethod::CreditCard => {
                self.card_checkout(user_id, &customer_id, tier, amount_cents, request)
                    .await
            }
            PaymentMethod::Pix | PaymentMethod::Boleto => {
                self.charge_checkout(user_id, &customer_id, tier, amount_cents, request.method)
                    .await
            }
        }
    }

    async fn card_checkout(
        &self,
        user_id: Uuid,
        customer_id: &str,
        tier: SubscriptionTier,
        amount_cents: i64,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutOutcome> {
        let card = request
            .card
            .clone()
            .ok_or_else(|| BillingError::Validation("card token required".to_string()))?;

        let subscription = self
            .gateway
            .create_subscription(&CreateSubscriptionParams {
                customer_id: customer_id.to_string(),
                user_id,
                tier,
                amount_cents,
                cycle: request.billing_cycle.unwrap_or_default(),
                card,
                description: format!("Assinatura {tier}"),
            })
            .await?;

        // Card capture is synchronous: the entitlement period opens now,
        // keyed on the gateway subscription id until its first payment
        // event arrives with a concrete payment id.
        self.subscriptions
            .renew_or_create(&RenewOrCreate {
                user_id,
                tier,
                payment_id: subscription.id.clone(),
                amount_cents,
                method: PaymentMethod::CreditCard,
                gateway_customer_id: Some(customer_id.to_string()),
            })
            .await?;
        let entitlement = self.entitlement.project(user_id).await?;

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            subscription_id = %subscription.id,
            "Card checkout complete, premium active"
        );

        Ok(CheckoutOutcome::Subscription {
            subscription,
            is_premium: entitlement.is_premium,
        })
    }

    async fn charge_checkout(
        &self,
        user_id: Uuid,
        customer_id: &str,
        tier: SubscriptionTier,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> BillingResult<CheckoutOutcome> {
        let due = OffsetDateTime::now_utc() + Duration::days(CHECKOUT_DUE_DAYS);
        let payment = self
            .gateway
            .create_payment(&CreatePaymentParams {
                customer_id: customer_id.to_string(),
                user_id,
                tier,
                amount_cents,
                method,
                due_date: format!(
                    "{:04}-{:02}-{:02}",
                    due.year(),
                    u8::from(due.month()),
                    due.day()
                ),
                description: format!("Assinatura {tier}"),
            })
            .await?;

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            payment_id = %payment.id,
            method = %method,
            "Checkout charge issued, awaiting confirmation"
        );

        match method {
            PaymentMethod::Pix => {
                let PixQr {
                    encoded_image,
                    payload,
                } = self.gateway.get_pix_qr(&payment.id).await?;
                Ok(CheckoutOutcome::PixCharge {
                    payment_id: payment.id,
                    qr_code: encoded_image,
                    copy_paste_code: payload,
                })
            }
            PaymentMethod::Boleto => Ok(CheckoutOutcome::BoletoCharge {
                boleto_url: payment.bank_slip_url.unwrap_or_default(),
                payment_id: payment.id,
            }),
            PaymentMethod::CreditCard => unreachable!("card handled by card_checkout"),
        }
    }
}

fn validate(request: &CheckoutRequest) -> BillingResult<()> {
    if !request.tier.is_paid() {
        return Err(BillingError::Validation(
            "free tier cannot be purchased".to_string(),
        ));
    }
    // Recurring billing is card-only; PIX/boleto buyers get one-off
    // charges tied to the internal subscription row instead.
    if request.method == PaymentMethod::CreditCard && request.card.is_none() {
        return Err(BillingError::Validation("card token required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tier: SubscriptionTier, method: PaymentMethod, card: bool) -> CheckoutRequest {
        CheckoutRequest {
            tier,
            method,
            billing_cycle: None,
            card: card.then(|| CardToken {
                credit_card_token: "tok_1".to_string(),
            }),
        }
    }

    #[test]
    fn free_tier_is_rejected() {
        let err = validate(&request(
            SubscriptionTier::Free,
            PaymentMethod::Pix,
            false,
        ))
        .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn card_method_requires_token() {
        let err = validate(&request(
            SubscriptionTier::Pro,
            PaymentMethod::CreditCard,
            false,
        ))
        .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        assert!(validate(&request(
            SubscriptionTier::Pro,
            PaymentMethod::CreditCard,
            true,
        ))
        .is_ok());
    }

    #[test]
    fn pix_needs_no_card() {
        assert!(validate(&request(SubscriptionTier::Lite, PaymentMethod::Pix, false)).is_ok());
    }

    #[test]
    fn checkout_request_deserializes_camel_case() {
        let req: CheckoutRequest = serde_json::from_str(
            r#"{"tier": "pro", "method": "PIX", "billingCycle": "MONTHLY"}"#,
        )
        .unwrap();
        assert_eq!(req.tier, SubscriptionTier::Pro);
        assert_eq!(req.method, PaymentMethod::Pix);
        assert_eq!(req.billing_cycle, Some(BillingCycle::Monthly));
    }
}
