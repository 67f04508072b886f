//! Download quota endpoints
//!
//! The quota gate only needs the database, so these routes stay up even
//! when the payment gateway is unconfigured.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use galeria_billing::{QuotaService, QuotaStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize, Default)]
pub struct DownloadQuery {
    /// Set for resources only paid tiers may download.
    #[serde(default)]
    pub premium: bool,
}

/// GET /downloads/quota
pub async fn quota_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<QuotaStatus>> {
    let quota = QuotaService::new(state.pool.clone());
    let status = quota.get_status(user.user_id).await?;
    Ok(Json(status))
}

/// POST /downloads/{resource_id}
///
/// Authorizes the download against the caller's daily quota and records
/// it. Re-downloading a resource already counted today always passes and
/// consumes no additional quota.
pub async fn record_download(
    State(state): State<AppState>,
    user: AuthUser,
    Path(resource_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Json<QuotaStatus>> {
    let quota = QuotaService::new(state.pool.clone());
    let status = quota
        .authorize_and_record(user.user_id, resource_id, query.premium)
        .await?;

    tracing::debug!(
        user_id = %user.user_id,
        resource_id = %resource_id,
        current = status.current,
        limit = status.limit,
        "Download recorded"
    );
    Ok(Json(status))
}
