//! Daily download quota enforcement
//!
//! The unit of counting is "distinct resources touched today", not
//! "download events today": re-downloading the same resource on the
//! same calendar day consumes no additional quota. "Today" is a
//! calendar date in a fixed reference timezone, applied identically by
//! the SQL aggregate and the in-memory fallback reduction.

use sqlx::PgPool;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use galeria_shared::SubscriptionTier;

use crate::error::{BillingError, BillingResult};

/// Fixed reference timezone offset for quota day boundaries (UTC-3,
/// the storefront's home timezone; no DST).
pub const REFERENCE_UTC_OFFSET_HOURS: i8 = -3;

/// Calendar date of `ts` in the reference timezone.
pub fn reference_local_date(ts: OffsetDateTime) -> Date {
    // Offset construction with constant in-range arguments cannot fail.
    let offset = UtcOffset::from_hms(REFERENCE_UTC_OFFSET_HOURS, 0, 0)
        .unwrap_or(UtcOffset::UTC);
    ts.to_offset(offset).date()
}

/// Fallback quota computation: reduce raw download rows into the count
/// of distinct resources on `now`'s reference-local date.
///
/// Must agree with the SQL aggregate in [`QuotaService::get_status`] by
/// construction: same offset constant, same date function.
pub fn count_distinct_today_fallback(rows: &[(Uuid, OffsetDateTime)], now: OffsetDateTime) -> i64 {
    let today = reference_local_date(now);
    let mut seen = std::collections::HashSet::new();
    for (resource_id, downloaded_at) in rows {
        if reference_local_date(*downloaded_at) == today {
            seen.insert(*resource_id);
        }
    }
    seen.len() as i64
}

/// Quota status for a user right now.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QuotaStatus {
    /// Distinct resources downloaded today (reference timezone).
    pub current: i64,
    /// Daily limit derived from the tier.
    pub limit: i64,
    pub remaining: i64,
    pub tier: SubscriptionTier,
    /// Whether one more *new* resource may be downloaded today.
    pub allowed: bool,
}

#[derive(Clone)]
pub struct QuotaService {
    pool: PgPool,
}

impl QuotaService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Compute the user's quota status from the projected tier and the
    /// deduplicated daily download count.
    pub async fn get_status(&self, user_id: Uuid) -> BillingResult<QuotaStatus> {
        let tier = self.user_tier(user_id).await?;
        let current = self.distinct_downloads_today(user_id).await?;
        Ok(Self::build_status(tier, current))
    }

    /// Gate a download attempt and record the usage row.
    ///
    /// Re-fetches quota immediately before the write decision. A
    /// resource already counted today passes regardless of the limit
    /// (it consumes no new quota unit); a new resource requires
    /// headroom. `requires_premium` is supplied by the catalog layer.
    pub async fn authorize_and_record(
        &self,
        user_id: Uuid,
        resource_id: Uuid,
        requires_premium: bool,
    ) -> BillingResult<QuotaStatus> {
        let tier = self.user_tier(user_id).await?;

        if requires_premium && !tier.is_paid() {
            return Err(BillingError::NotEntitled);
        }

        let current = self.distinct_downloads_today(user_id).await?;
        let limit = tier.daily_download_limit();

        if current >= limit && !self.downloaded_today(user_id, resource_id).await? {
            return Err(BillingError::QuotaExceeded { current, limit });
        }

        sqlx::query("INSERT INTO downloads (user_id, resource_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(resource_id)
            .execute(&self.pool)
            .await?;

        let current = self.distinct_downloads_today(user_id).await?;
        tracing::debug!(
            user_id = %user_id,
            resource_id = %resource_id,
            current = current,
            limit = limit,
            "Download recorded"
        );

        Ok(Self::build_status(tier, current))
    }

    fn build_status(tier: SubscriptionTier, current: i64) -> QuotaStatus {
        let limit = tier.daily_download_limit();
        QuotaStatus {
            current,
            limit,
            remaining: (limit - current).max(0),
            tier,
            allowed: current < limit,
        }
    }

    /// Set-based aggregate: distinct resources whose download timestamp
    /// falls on today's reference-local date. The interval shift mirrors
    /// [`reference_local_date`] exactly.
    async fn distinct_downloads_today(&self, user_id: Uuid) -> BillingResult<i64> {
        let today = reference_local_date(OffsetDateTime::now_utc());
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT resource_id)
            FROM downloads
            WHERE user_id = $1
              AND ((downloaded_at AT TIME ZONE 'UTC') + make_interval(hours => $2))::date = $3
            "#,
        )
        .bind(user_id)
        .bind(i32::from(REFERENCE_UTC_OFFSET_HOURS))
        .bind(today)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn downloaded_today(&self, user_id: Uuid, resource_id: Uuid) -> BillingResult<bool> {
        let today = reference_local_date(OffsetDateTime::now_utc());
        let exists: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM downloads
            WHERE user_id = $1
              AND resource_id = $2
              AND ((downloaded_at AT TIME ZONE 'UTC') + make_interval(hours => $3))::date = $4
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(resource_id)
        .bind(i32::from(REFERENCE_UTC_OFFSET_HOURS))
        .bind(today)
        .fetch_optional(&self.pool)
        .await?;
        Ok(exists.is_some())
    }

    /// Tier as projected on the profile; no projection means free.
    async fn user_tier(&self, user_id: Uuid) -> BillingResult<SubscriptionTier> {
        let row: Option<(bool, Option<String>)> =
            sqlx::query_as("SELECT is_premium, subscription_tier FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((is_premium, tier)) = row else {
            return Err(BillingError::NotFound(format!("user {user_id}")));
        };

        Ok(if is_premium {
            tier.as_deref()
                .and_then(SubscriptionTier::parse)
                .unwrap_or(SubscriptionTier::Free)
        } else {
            SubscriptionTier::Free
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn same_resource_counts_once_per_day() {
        let now = datetime!(2026-08-30 18:00 UTC);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![
            (a, datetime!(2026-08-30 10:00 UTC)),
            (a, datetime!(2026-08-30 12:30 UTC)),
            (a, datetime!(2026-08-30 17:45 UTC)),
            (b, datetime!(2026-08-30 11:00 UTC)),
        ];
        assert_eq!(count_distinct_today_fallback(&rows, now), 2);
    }

    #[test]
    fn midnight_boundary_splits_usage_across_days() {
        // 23:59 and 00:01 reference time straddle the local midnight:
        // two separate days' usage, one unit each.
        let resource = Uuid::new_v4();
        // 23:59 local (UTC-3) == 02:59 UTC next day
        let before_midnight = datetime!(2026-08-31 02:59 UTC);
        // 00:01 local == 03:01 UTC
        let after_midnight = datetime!(2026-08-31 03:01 UTC);
        let rows = vec![(resource, before_midnight), (resource, after_midnight)];

        assert_ne!(
            reference_local_date(before_midnight),
            reference_local_date(after_midnight)
        );
        assert_eq!(count_distinct_today_fallback(&rows, before_midnight), 1);
        assert_eq!(count_distinct_today_fallback(&rows, after_midnight), 1);
    }

    #[test]
    fn other_days_are_excluded() {
        let now = datetime!(2026-08-30 12:00 UTC);
        let rows = vec![
            (Uuid::new_v4(), datetime!(2026-08-29 12:00 UTC)),
            (Uuid::new_v4(), datetime!(2026-08-31 12:00 UTC)),
        ];
        assert_eq!(count_distinct_today_fallback(&rows, now), 0);
    }

    #[test]
    fn reference_date_shifts_utc_evenings_back() {
        // 01:00 UTC is 22:00 the previous day in UTC-3.
        let ts = datetime!(2026-08-30 01:00 UTC);
        assert_eq!(
            reference_local_date(ts),
            time::macros::date!(2026-08-29)
        );
    }
}
