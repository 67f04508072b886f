//! Internal sweep triggers
//!
//! The worker runs these on a schedule; the endpoints exist so an
//! operator can force a pass without waiting for the next cron tick.
//! Both are protected by the SWEEP_SECRET bearer token.

use axum::{extract::State, http::HeaderMap, Json};
use galeria_billing::SweepReport;
use subtle::ConstantTimeEq;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// GET /internal/sweep/expire
pub async fn run_expiration(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepReport>> {
    verify_sweep_secret(&state, &headers)?;

    let billing = state
        .billing_service()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing not configured".to_string()))?;

    let report = billing.sweep.run_expiration().await?;
    tracing::info!(
        processed = report.processed,
        renewed = report.renewed,
        blocked = report.blocked,
        "Manual expiration sweep complete"
    );
    Ok(Json(report))
}

/// GET /internal/sweep/notify
pub async fn run_expiry_notices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepReport>> {
    verify_sweep_secret(&state, &headers)?;

    let billing = state
        .billing_service()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing not configured".to_string()))?;

    let report = billing.sweep.run_expiry_notices().await?;
    tracing::info!(processed = report.processed, "Manual expiry-notice sweep complete");
    Ok(Json(report))
}

fn verify_sweep_secret(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    let expected = state.config.sweep_secret.as_str();

    if presented.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Invalid sweep secret".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sqlx::postgres::PgPoolOptions;

    fn test_state() -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/galeria_test")
            .unwrap();
        let config = Config {
            database_url: "postgres://localhost/galeria_test".to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            sweep_secret: "sweep-secret-value".to_string(),
            webhook_token: None,
        };
        AppState {
            pool,
            config,
            billing: None,
        }
    }

    #[tokio::test]
    async fn bearer_secret_must_match() {
        let state = test_state();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sweep-secret-value".parse().unwrap());
        assert!(verify_sweep_secret(&state, &headers).is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert("authorization", "Bearer nope".parse().unwrap());
        assert!(verify_sweep_secret(&state, &wrong).is_err());
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_rejected() {
        let state = test_state();

        assert!(verify_sweep_secret(&state, &HeaderMap::new()).is_err());

        let mut basic = HeaderMap::new();
        basic.insert("authorization", "Basic sweep-secret-value".parse().unwrap());
        assert!(verify_sweep_secret(&state, &basic).is_err());
    }
}
