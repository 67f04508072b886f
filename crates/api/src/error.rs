//! API error type and HTTP mapping
//!
//! `quota_exceeded` and `not_entitled` are deliberately distinct codes:
//! the client renders "wait until tomorrow" for one and "upgrade your
//! plan" for the other.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use galeria_billing::BillingError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not entitled")]
    NotEntitled,

    #[error("quota exceeded ({current}/{limit})")]
    QuotaExceeded { current: i64, limit: i64 },

    #[error("payment gateway unavailable: {0}")]
    Gateway(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotEntitled => StatusCode::FORBIDDEN,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients.
    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::NotEntitled => "not_entitled",
            ApiError::QuotaExceeded { .. } => "quota_exceeded",
            ApiError::Gateway(_) => "gateway_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::Gateway { message, .. } => ApiError::Gateway(message),
            BillingError::Configuration(message) => ApiError::ServiceUnavailable(message),
            BillingError::QuotaExceeded { current, limit } => {
                ApiError::QuotaExceeded { current, limit }
            }
            BillingError::NotEntitled => ApiError::NotEntitled,
            BillingError::Validation(message) => ApiError::Validation(message),
            BillingError::NotFound(what) => ApiError::NotFound(what),
            BillingError::ReconciliationConflict(message) => ApiError::Validation(message),
            BillingError::Database(message) => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_and_entitlement_codes_are_distinct() {
        let quota = ApiError::from(BillingError::QuotaExceeded {
            current: 1,
            limit: 1,
        });
        let entitlement = ApiError::from(BillingError::NotEntitled);
        assert_ne!(quota.code(), entitlement.code());
        assert_ne!(quota.status(), entitlement.status());
        assert_ne!(quota.code(), ApiError::NotFound("x".into()).code());
    }

    #[test]
    fn gateway_errors_map_to_bad_gateway() {
        let err = ApiError::from(BillingError::Gateway {
            status: 500,
            message: "upstream".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
