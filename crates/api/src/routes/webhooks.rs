//! Gateway webhook receiver
//!
//! The gateway retries deliveries that do not get a 200, and pauses the
//! whole queue after enough failures. So this endpoint acknowledges every
//! well-formed delivery with 200 even when processing fails internally;
//! the nightly reconciliation poller picks up anything that was dropped.

use axum::{extract::State, http::HeaderMap, Json};
use galeria_billing::GatewayEvent;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// POST /webhooks/gateway
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<GatewayEvent>,
) -> ApiResult<Json<Value>> {
    verify_webhook_token(&state, &headers)?;

    let billing = state
        .billing_service()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing not configured".to_string()))?;

    let event_name = event.event.as_str().to_string();

    match billing.webhooks.handle_event(event).await {
        Ok(outcome) => {
            tracing::info!(event = %event_name, outcome = ?outcome, "Webhook processed");
        }
        Err(e) => {
            // Acknowledged anyway; reconciliation will converge this payment.
            tracing::error!(event = %event_name, error = %e, "Webhook processing failed");
        }
    }

    Ok(Json(json!({ "received": true, "event": event_name })))
}

/// Check the shared webhook token when one is configured.
///
/// The gateway echoes the token back in the `x-webhook-token` header.
/// Comparison is constant-time to avoid leaking the token by timing.
fn verify_webhook_token(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.config.webhook_token.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get("x-webhook-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid webhook token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sqlx::postgres::PgPoolOptions;

    fn test_state(webhook_token: Option<&str>) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/galeria_test")
            .unwrap();
        let config = Config {
            database_url: "postgres://localhost/galeria_test".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            sweep_secret: "secret".to_string(),
            webhook_token: webhook_token.map(str::to_string),
        };
        AppState {
            pool,
            config,
            billing: None,
        }
    }

    #[tokio::test]
    async fn no_configured_token_accepts_any_request() {
        let state = test_state(None);
        let headers = HeaderMap::new();
        assert!(verify_webhook_token(&state, &headers).is_ok());
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let state = test_state(Some("expected-token"));
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-token", "wrong".parse().unwrap());
        assert!(verify_webhook_token(&state, &headers).is_err());
    }

    #[tokio::test]
    async fn missing_token_is_rejected_when_configured() {
        let state = test_state(Some("expected-token"));
        let headers = HeaderMap::new();
        assert!(verify_webhook_token(&state, &headers).is_err());
    }

    #[tokio::test]
    async fn matching_token_is_accepted() {
        let state = test_state(Some("expected-token"));
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-token", "expected-token".parse().unwrap());
        assert!(verify_webhook_token(&state, &headers).is_ok());
    }
}
