//! Payment gateway client
//!
//! Typed façade over the external gateway's HTTP API: customers,
//! one-off payments (PIX / boleto / card) and recurring card
//! subscriptions. Pure request/response mapping; holds no state beyond
//! the HTTP client and credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use uuid::Uuid;

use galeria_shared::{BillingCycle, PaymentMethod, TransactionStatus};

use crate::error::{BillingError, BillingResult};
use crate::events::payment_reference;

/// Bounded timeout on every gateway call. Failures surface as
/// `BillingError::Gateway`, never silently swallowed.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-only gateway fetches are retried with exponential backoff.
const GET_RETRY_BASE_MS: u64 = 200;
const GET_RETRY_ATTEMPTS: usize = 3;

/// Gateway credentials and endpoints, loaded from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    /// Shared token the gateway echoes back on webhook callbacks.
    pub webhook_token: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> BillingResult<Self> {
        let api_key = std::env::var("GATEWAY_API_KEY")
            .map_err(|_| BillingError::Configuration("GATEWAY_API_KEY not set".to_string()))?;
        if api_key.is_empty() {
            return Err(BillingError::Configuration(
                "GATEWAY_API_KEY is empty".to_string(),
            ));
        }

        let base_url = std::env::var("GATEWAY_BASE_URL")
            .unwrap_or_else(|_| "https://api.gateway.example.com/v3".to_string());
        let webhook_token = std::env::var("GATEWAY_WEBHOOK_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            api_key,
            base_url,
            webhook_token,
        })
    }
}

/// Customer record on the gateway side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCustomer {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// Payment as the gateway reports it, on webhooks and on direct fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub id: String,
    /// Gateway customer id the payment belongs to.
    pub customer: String,
    /// Gross amount in the gateway's currency units (reais).
    pub value: f64,
    /// Amount after gateway fees, when settled.
    #[serde(default)]
    pub net_value: Option<f64>,
    pub billing_type: PaymentMethod,
    /// Raw gateway status (`PENDING`, `RECEIVED`, `CONFIRMED`, ...).
    pub status: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub bank_slip_url: Option<String>,
}

impl PaymentSnapshot {
    pub fn gross_cents(&self) -> i64 {
        (self.value * 100.0).round() as i64
    }

    pub fn net_cents(&self) -> i64 {
        self.net_value
            .map(|v| (v * 100.0).round() as i64)
            .unwrap_or_else(|| self.gross_cents())
    }

    pub fn fee_cents(&self) -> i64 {
        self.gross_cents() - self.net_cents()
    }

    /// Map the gateway's payment status onto the ledger vocabulary.
    ///
    /// `RECEIVED` is deliberately `pending`: only `CONFIRMED` grants
    /// entitlement. Unknown statuses return `None` and are skipped by
    /// reconciliation rather than guessed at.
    pub fn ledger_status(&self) -> Option<TransactionStatus> {
        match self.status.as_str() {
            "PENDING" | "RECEIVED" | "AWAITING_RISK_ANALYSIS" => Some(TransactionStatus::Pending),
            "CONFIRMED" => Some(TransactionStatus::Paid),
            "OVERDUE" => Some(TransactionStatus::Overdue),
            "DELETED" | "CANCELLED" | "REFUNDED" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Recurring subscription as the gateway reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySubscription {
    pub id: String,
    pub customer: String,
    pub value: f64,
    pub billing_type: PaymentMethod,
    pub cycle: BillingCycle,
    pub status: String,
    #[serde(default)]
    pub next_due_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// PIX charge artifacts returned to the buyer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixQr {
    pub encoded_image: String,
    /// Copy-paste ("copia e cola") code.
    pub payload: String,
}

/// Parameters for a one-off charge.
#[derive(Debug, Clone)]
pub struct CreatePaymentParams {
    pub customer_id: String,
    pub user_id: Uuid,
    pub tier: galeria_shared::SubscriptionTier,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    /// Due date as `YYYY-MM-DD`.
    pub due_date: String,
    pub description: String,
}

/// Tokenized card handed to the gateway for recurring billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardToken {
    pub credit_card_token: String,
}

/// Parameters for a recurring card subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionParams {
    pub customer_id: String,
    pub user_id: Uuid,
    pub tier: galeria_shared::SubscriptionTier,
    pub amount_cents: i64,
    pub cycle: BillingCycle,
    pub card: CardToken,
    pub description: String,
}

/// Filters for listing a customer's payments.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilters {
    pub customer_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PaymentList {
    data: Vec<PaymentSnapshot>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    errors: Vec<GatewayErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorEntry {
    #[serde(default)]
    description: String,
}

/// HTTP client for the payment gateway.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Configuration(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> BillingResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Create a customer on the gateway for this user.
    ///
    /// The external reference carries the user id so reconciliation can
    /// recover intent even without local state.
    pub async fn create_customer(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
    ) -> BillingResult<GatewayCustomer> {
        let body = serde_json::json!({
            "name": name,
            "email": email,
            "externalReference": user_id.to_string(),
        });

        let resp = self
            .http
            .post(self.url("/customers"))
            .header("access_token", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Create a one-off PIX/boleto/card charge.
    pub async fn create_payment(
        &self,
        params: &CreatePaymentParams,
    ) -> BillingResult<PaymentSnapshot> {
        let body = serde_json::json!({
            "customer": params.customer_id,
            "billingType": params.method.wire_name(),
            "value": params.amount_cents as f64 / 100.0,
            "dueDate": params.due_date,
            "description": params.description,
            "externalReference": payment_reference(params.tier, params.user_id),
        });

        let resp = self
            .http
            .post(self.url("/payments"))
            .header("access_token", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Create a recurring subscription. Card is the only method legally
    /// used for recurring billing; other methods are issued as one-off
    /// payments tied manually to the internal subscription row.
    pub async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> BillingResult<GatewaySubscription> {
        let body = serde_json::json!({
            "customer": params.customer_id,
            "billingType": PaymentMethod::CreditCard.wire_name(),
            "value": params.amount_cents as f64 / 100.0,
            "cycle": params.cycle.wire_name(),
            "description": params.description,
            "creditCardToken": params.card.credit_card_token,
            "externalReference": payment_reference(params.tier, params.user_id),
        });

        let resp = self
            .http
            .post(self.url("/subscriptions"))
            .header("access_token", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Fetch a payment's current state. Retried: this is the manual
    /// reconciliation path and a transient failure here would otherwise
    /// force the operator to re-trigger it.
    pub async fn get_payment(&self, payment_id: &str) -> BillingResult<PaymentSnapshot> {
        self.get_with_retry(&format!("/payments/{payment_id}")).await
    }

    pub async fn get_subscription(&self, subscription_id: &str) -> BillingResult<GatewaySubscription> {
        self.get_with_retry(&format!("/subscriptions/{subscription_id}"))
            .await
    }

    /// Fetch the PIX QR code and copy-paste payload for a charge.
    pub async fn get_pix_qr(&self, payment_id: &str) -> BillingResult<PixQr> {
        self.get_with_retry(&format!("/payments/{payment_id}/pixQrCode"))
            .await
    }

    pub async fn list_payments(
        &self,
        filters: &PaymentFilters,
    ) -> BillingResult<Vec<PaymentSnapshot>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(customer) = &filters.customer_id {
            query.push(("customer", customer.clone()));
        }
        if let Some(status) = &filters.status {
            query.push(("status", status.clone()));
        }
        if let Some(limit) = filters.limit {
            query.push(("limit", limit.to_string()));
        }

        let resp = self
            .http
            .get(self.url("/payments"))
            .header("access_token", &self.config.api_key)
            .query(&query)
            .send()
            .await?;

        let list: PaymentList = Self::read_json(resp).await?;
        Ok(list.data)
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(&self, path: &str) -> BillingResult<T> {
        let strategy = ExponentialBackoff::from_millis(GET_RETRY_BASE_MS).take(GET_RETRY_ATTEMPTS);

        Retry::spawn(strategy, || async {
            let resp = self
                .http
                .get(self.url(path))
                .header("access_token", &self.config.api_key)
                .send()
                .await?;
            Self::read_json(resp).await
        })
        .await
    }

    /// Decode a gateway response, mapping non-2xx into
    /// `BillingError::Gateway` carrying the provider's message.
    async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> BillingResult<T> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GatewayErrorBody>(&body)
                .ok()
                .and_then(|b| b.errors.into_iter().next())
                .map(|e| e.description)
                .filter(|d| !d.is_empty())
                .unwrap_or(body);
            return Err(BillingError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| BillingError::Gateway {
            status: status.as_u16(),
            message: format!("invalid gateway response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galeria_shared::SubscriptionTier;

    fn client_for(server: &mockito::ServerGuard) -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            api_key: "test-key".to_string(),
            base_url: server.url(),
            webhook_token: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn get_payment_parses_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/payments/pay_123")
            .match_header("access_token", "test-key")
            .with_status(200)
            .with_body(
                r#"{
                    "id": "pay_123",
                    "customer": "cus_9",
                    "value": 29.90,
                    "netValue": 28.41,
                    "billingType": "PIX",
                    "status": "CONFIRMED",
                    "externalReference": "premium:pro:7f8d2f66-12aa-4b6e-9c3a-000000000001"
                }"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let payment = client.get_payment("pay_123").await.unwrap();

        mock.assert_async().await;
        assert_eq!(payment.gross_cents(), 2990);
        assert_eq!(payment.net_cents(), 2841);
        assert_eq!(payment.fee_cents(), 149);
        assert_eq!(
            payment.ledger_status(),
            Some(galeria_shared::TransactionStatus::Paid)
        );
    }

    #[tokio::test]
    async fn gateway_error_carries_provider_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/payments")
            .with_status(400)
            .with_body(r#"{"errors":[{"code":"invalid_value","description":"Invalid value"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_payment(&CreatePaymentParams {
                customer_id: "cus_9".to_string(),
                user_id: Uuid::new_v4(),
                tier: SubscriptionTier::Pro,
                amount_cents: 2990,
                method: PaymentMethod::Pix,
                due_date: "2026-09-02".to_string(),
                description: "Assinatura pro".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            BillingError::Gateway { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid value");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[test]
    fn received_maps_to_pending_not_paid() {
        let payment = PaymentSnapshot {
            id: "pay_1".to_string(),
            customer: "cus_1".to_string(),
            value: 9.90,
            net_value: None,
            billing_type: PaymentMethod::Boleto,
            status: "RECEIVED".to_string(),
            due_date: None,
            description: None,
            external_reference: None,
            invoice_url: None,
            bank_slip_url: None,
        };
        assert_eq!(
            payment.ledger_status(),
            Some(galeria_shared::TransactionStatus::Pending)
        );
    }
}
