//! Transaction ledger
//!
//! One row per external payment identifier. The upsert keyed on that
//! identifier is the retry-safety mechanism for at-least-once webhook
//! delivery: re-processing a payment is an update, never a duplicate
//! insert, and two concurrent processors converge to the same row.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use galeria_shared::{PaymentMethod, SubscriptionTier, TransactionStatus};

use crate::error::BillingResult;

/// Ledger row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transaction {
    pub gateway_payment_id: String,
    pub user_id: Uuid,
    pub tier: String,
    pub gross_cents: i64,
    pub fee_cents: i64,
    pub net_cents: i64,
    pub method: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    pub fn status(&self) -> Option<TransactionStatus> {
        TransactionStatus::parse(&self.status)
    }
}

/// Data for a ledger upsert, sighted from a webhook or the poller.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub gateway_payment_id: String,
    pub user_id: Uuid,
    pub tier: SubscriptionTier,
    pub gross_cents: i64,
    pub fee_cents: i64,
    pub net_cents: i64,
    pub method: PaymentMethod,
    pub status: TransactionStatus,
}

/// Monotonic status merge.
///
/// Returns `Some(next)` when the incoming status may be applied, `None`
/// when the current status must be kept. `paid` and `cancelled` are
/// terminal; `overdue` may still settle to `paid`.
pub fn next_status(
    current: TransactionStatus,
    incoming: TransactionStatus,
) -> Option<TransactionStatus> {
    use TransactionStatus::*;
    match (current, incoming) {
        (Paid, _) | (Cancelled, _) => None,
        (current, incoming) if current == incoming => None,
        (Pending, incoming) => Some(incoming),
        (Overdue, Paid) | (Overdue, Cancelled) => Some(incoming),
        (Overdue, Pending) => None,
        _ => None,
    }
}

/// Append/upsert store for payment transactions.
#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a payment sighting.
    ///
    /// The ON CONFLICT branch encodes the same merge as [`next_status`]:
    /// a `paid` or `cancelled` row keeps its status regardless of what
    /// the (possibly stale, possibly duplicated) incoming event says.
    pub async fn upsert(&self, tx: &NewTransaction) -> BillingResult<Transaction> {
        let row: Transaction = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (gateway_payment_id, user_id, tier, gross_cents, fee_cents, net_cents, method, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (gateway_payment_id) DO UPDATE SET
                status = CASE
                    WHEN transactions.status IN ('paid', 'cancelled') THEN transactions.status
                    WHEN transactions.status = 'overdue' AND EXCLUDED.status = 'pending'
                        THEN transactions.status
                    ELSE EXCLUDED.status
                END,
                gross_cents = EXCLUDED.gross_cents,
                fee_cents = EXCLUDED.fee_cents,
                net_cents = EXCLUDED.net_cents,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&tx.gateway_payment_id)
        .bind(tx.user_id)
        .bind(tx.tier.as_str())
        .bind(tx.gross_cents)
        .bind(tx.fee_cents)
        .bind(tx.net_cents)
        .bind(tx.method.as_str())
        .bind(tx.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            payment_id = %row.gateway_payment_id,
            status = %row.status,
            "Ledger row upserted"
        );

        Ok(row)
    }

    pub async fn get(&self, payment_id: &str) -> BillingResult<Option<Transaction>> {
        let row = sqlx::query_as("SELECT * FROM transactions WHERE gateway_payment_id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Purchase history for a user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> BillingResult<Vec<Transaction>> {
        let rows = sqlx::query_as(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn paid_never_regresses() {
        for incoming in [Pending, Overdue, Cancelled, Paid] {
            assert_eq!(next_status(Paid, incoming), None);
        }
    }

    #[test]
    fn cancelled_is_terminal() {
        for incoming in [Pending, Overdue, Paid, Cancelled] {
            assert_eq!(next_status(Cancelled, incoming), None);
        }
    }

    #[test]
    fn pending_advances_anywhere() {
        assert_eq!(next_status(Pending, Paid), Some(Paid));
        assert_eq!(next_status(Pending, Overdue), Some(Overdue));
        assert_eq!(next_status(Pending, Cancelled), Some(Cancelled));
        assert_eq!(next_status(Pending, Pending), None);
    }

    #[test]
    fn overdue_settles_late_but_never_reopens() {
        assert_eq!(next_status(Overdue, Paid), Some(Paid));
        assert_eq!(next_status(Overdue, Cancelled), Some(Cancelled));
        assert_eq!(next_status(Overdue, Pending), None);
        assert_eq!(next_status(Overdue, Overdue), None);
    }
}
