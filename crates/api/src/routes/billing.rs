//! Checkout and reconciliation endpoints

use axum::{extract::State, Json};
use galeria_billing::{CheckoutOutcome, CheckoutRequest, ReconcileOutcome};
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub payment_id: String,
}

/// POST /billing/checkout
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutOutcome>> {
    let billing = state
        .billing_service()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing not configured".to_string()))?;

    let outcome = billing.checkout.checkout(user.user_id, &request).await?;

    tracing::info!(user_id = %user.user_id, tier = %request.tier.as_str(), "Checkout completed");
    Ok(Json(outcome))
}

/// POST /billing/reconcile
///
/// On-demand variant of the nightly reconciliation pass. The storefront
/// calls this from the "I already paid" button on the pending-payment
/// screen, so confirmation does not have to wait for the webhook.
pub async fn reconcile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ReconcileRequest>,
) -> ApiResult<Json<ReconcileOutcome>> {
    if request.payment_id.trim().is_empty() {
        return Err(ApiError::Validation("paymentId is required".to_string()));
    }

    let billing = state
        .billing_service()
        .ok_or_else(|| ApiError::ServiceUnavailable("Billing not configured".to_string()))?;

    let outcome = billing
        .reconcile
        .reconcile_payment(&request.payment_id)
        .await?;

    tracing::info!(
        user_id = %user.user_id,
        payment_id = %request.payment_id,
        gateway_status = %outcome.gateway_status,
        "Manual reconciliation completed"
    );
    Ok(Json(outcome))
}
