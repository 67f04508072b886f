#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Galeria shared types
//!
//! Domain vocabulary used by every crate in the workspace: subscription
//! tiers, payment methods, status enums, and database pool construction.

pub mod db;
pub mod tier;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use tier::SubscriptionTier;
pub use types::{BillingCycle, PaymentMethod, SubscriptionStatus, TransactionStatus};
