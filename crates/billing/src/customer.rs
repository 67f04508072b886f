//! Gateway customer management

use sqlx::PgPool;
use uuid::Uuid;

use crate::client::GatewayClient;
use crate::error::{BillingError, BillingResult};

#[derive(Clone)]
pub struct CustomerService {
    gateway: GatewayClient,
    pool: PgPool,
}

impl CustomerService {
    pub fn new(gateway: GatewayClient, pool: PgPool) -> Self {
        Self { gateway, pool }
    }

    /// Return the user's gateway customer id, creating the customer on
    /// the gateway (and persisting the id) on first use.
    pub async fn ensure_customer(&self, user_id: Uuid) -> BillingResult<String> {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT email, display_name, gateway_customer_id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((email, name, existing)) = row else {
            return Err(BillingError::NotFound(format!("user {user_id}")));
        };

        if let Some(customer_id) = existing {
            return Ok(customer_id);
        }

        let customer = self.gateway.create_customer(user_id, &name, &email).await?;

        // COALESCE keeps the first-written id if a concurrent checkout
        // created one in the meantime.
        let (customer_id,): (String,) = sqlx::query_as(
            r#"
            UPDATE users
            SET gateway_customer_id = COALESCE(gateway_customer_id, $2)
            WHERE id = $1
            RETURNING gateway_customer_id
            "#,
        )
        .bind(user_id)
        .bind(&customer.id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, customer_id = %customer_id, "Gateway customer ensured");
        Ok(customer_id)
    }
}
