//! Billing error taxonomy

use thiserror::Error;

pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing and reconciliation engine.
///
/// The split matters to callers: gateway failures are retryable,
/// configuration failures are fatal for the handler that needs the
/// gateway, and quota/entitlement failures must stay distinguishable so
/// the client can render "upgrade your plan" versus "wait until
/// tomorrow".
#[derive(Debug, Error)]
pub enum BillingError {
    /// Upstream payment provider failure (retryable).
    #[error("gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    /// Missing or invalid gateway credentials (fatal, not retryable).
    #[error("billing not configured: {0}")]
    Configuration(String),

    /// Tier or customer mapping could not be resolved cleanly; a
    /// default was applied and the conflict logged. Never blocks
    /// webhook processing.
    #[error("reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    /// Daily download quota exhausted.
    #[error("daily download quota exceeded ({current}/{limit})")]
    QuotaExceeded { current: i64, limit: i64 },

    /// The resource requires a premium entitlement the user lacks.
    #[error("user is not entitled to this resource")]
    NotEntitled,

    /// Malformed or semantically invalid request.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl BillingError {
    /// Whether a caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Gateway { .. })
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        // Timeouts and transport failures surface as gateway errors so
        // callers treat them as retryable upstream conditions.
        BillingError::Gateway {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}
