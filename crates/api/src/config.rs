//! API server configuration

/// Runtime configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Shared secret for the internal sweep endpoints.
    pub sweep_secret: String,
    /// Token the gateway attaches to webhook callbacks; empty disables
    /// the check (local development).
    pub webhook_token: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let sweep_secret = std::env::var("SWEEP_SECRET")
            .map_err(|_| anyhow::anyhow!("SWEEP_SECRET must be set"))?;
        let webhook_token = std::env::var("GATEWAY_WEBHOOK_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            database_url,
            bind_address,
            sweep_secret,
            webhook_token,
        })
    }
}
