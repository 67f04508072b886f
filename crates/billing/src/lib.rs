// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Galeria Billing Module
//!
//! The billing and entitlement reconciliation engine: turns
//! asynchronous, at-least-once payment gateway events into a consistent
//! internal subscription state, projects premium entitlement onto user
//! profiles, and enforces the tier-based daily download quota.
//!
//! ## Features
//!
//! - **Gateway Adapter**: typed client for customers, PIX/boleto/card
//!   payments and recurring card subscriptions
//! - **Transaction Ledger**: idempotent upsert keyed on the external
//!   payment id, monotonic status
//! - **Subscription Lifecycle**: renew-or-create, suspend, expire,
//!   cancel
//! - **Entitlement Projection**: sole writer of the profile's
//!   `is_premium`/`subscription_tier`
//! - **Event Processing**: webhook callbacks and the manual
//!   reconciliation poller share one algorithm
//! - **Download Quota**: distinct-resources-per-day enforcement in a
//!   fixed reference timezone
//! - **Expiration Sweep**: lapsed-period revocation with optional
//!   re-billing

pub mod checkout;
pub mod client;
pub mod customer;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod ledger;
pub mod quota;
pub mod reconcile;
pub mod subscriptions;
pub mod sweep;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutOutcome, CheckoutRequest, CheckoutService};

// Client
pub use client::{
    CardToken, CreatePaymentParams, CreateSubscriptionParams, GatewayClient, GatewayConfig,
    GatewayCustomer, GatewaySubscription, PaymentFilters, PaymentSnapshot, PixQr,
};

// Customer
pub use customer::CustomerService;

// Entitlement
pub use entitlement::{Entitlement, EntitlementService};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{
    payment_reference, resolve_tier, resolve_user_reference, EventKind, GatewayEvent,
    ResolutionWarning, DEFAULT_ASSUMED_TIER,
};

// Ledger
pub use ledger::{next_status, LedgerService, NewTransaction, Transaction};

// Quota
pub use quota::{QuotaService, QuotaStatus, REFERENCE_UTC_OFFSET_HOURS};

// Reconcile
pub use reconcile::{ReconcileOutcome, ReconciliationService};

// Subscriptions
pub use subscriptions::{
    renewal_period, RenewOrCreate, Subscription, SubscriptionService, RENEWAL_PERIOD_DAYS,
};

// Sweep
pub use sweep::{ExpiryNotifier, NoopNotifier, SweepReport, SweepService};

// Webhooks
pub use webhooks::{Processed, WebhookHandler};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customers: CustomerService,
    pub entitlement: EntitlementService,
    pub gateway: GatewayClient,
    pub ledger: LedgerService,
    pub quota: QuotaService,
    pub reconcile: ReconciliationService,
    pub subscriptions: SubscriptionService,
    pub sweep: SweepService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Self::new(GatewayConfig::from_env()?, pool)
    }

    /// Create a new billing service with explicit config
    pub fn new(config: GatewayConfig, pool: PgPool) -> BillingResult<Self> {
        Self::with_notifier(config, pool, Arc::new(NoopNotifier))
    }

    /// Create a billing service with an injected expiry notifier
    pub fn with_notifier(
        config: GatewayConfig,
        pool: PgPool,
        notifier: Arc<dyn ExpiryNotifier>,
    ) -> BillingResult<Self> {
        let gateway = GatewayClient::new(config)?;
        let webhooks = WebhookHandler::new(pool.clone());
        let entitlement = EntitlementService::new(pool.clone());

        Ok(Self {
            checkout: CheckoutService::new(gateway.clone(), pool.clone()),
            customers: CustomerService::new(gateway.clone(), pool.clone()),
            entitlement: entitlement.clone(),
            ledger: LedgerService::new(pool.clone()),
            quota: QuotaService::new(pool.clone()),
            reconcile: ReconciliationService::new(
                gateway.clone(),
                webhooks.clone(),
                entitlement,
            ),
            subscriptions: SubscriptionService::new(pool.clone()),
            sweep: SweepService::new(pool, gateway.clone(), notifier),
            gateway,
            webhooks,
        })
    }
}
