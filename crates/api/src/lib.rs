// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Galeria API Library
//!
//! HTTP surface of the Galeria billing engine: gateway webhooks,
//! checkout, manual reconciliation, download quota gating and the
//! internal sweep triggers.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
