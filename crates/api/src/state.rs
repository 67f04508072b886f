//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing and reconciliation engine. `None` when the payment gateway
    /// is not configured; checkout, reconcile and sweep endpoints then
    /// answer 503 while the quota endpoints (database-only) keep working.
    pub billing: Option<Arc<galeria_billing::BillingService>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = match galeria_billing::BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Gateway billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Gateway billing not configured: {}", e);
                None
            }
        };

        Self {
            pool,
            config,
            billing,
        }
    }

    /// Get billing service reference (returns None when the gateway is not configured)
    pub fn billing_service(&self) -> Option<&Arc<galeria_billing::BillingService>> {
        self.billing.as_ref()
    }
}
