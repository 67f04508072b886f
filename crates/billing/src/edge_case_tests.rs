// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Reconciliation Engine
//!
//! Tests critical boundary conditions in:
//! - Ledger status monotonicity (REC-L01 to REC-L05)
//! - Tier resolution fallback chain (REC-T01 to REC-T07)
//! - Renewal window math (REC-R01 to REC-R03)
//! - Quota day boundaries (REC-Q01 to REC-Q06)
//! - Event payload parsing (REC-E01 to REC-E04)

#[cfg(test)]
mod ledger_monotonicity_tests {
    use crate::ledger::next_status;
    use galeria_shared::TransactionStatus::*;

    // =========================================================================
    // REC-L01: late pending event after paid - must not regress
    // =========================================================================
    #[test]
    fn test_paid_survives_late_pending() {
        assert_eq!(next_status(Paid, Pending), None);
    }

    // =========================================================================
    // REC-L02: duplicate confirmed delivery - second apply is a no-op
    // =========================================================================
    #[test]
    fn test_duplicate_paid_is_noop() {
        assert_eq!(next_status(Paid, Paid), None);
    }

    // =========================================================================
    // REC-L03: overdue then settled - late settlement wins
    // =========================================================================
    #[test]
    fn test_overdue_then_paid_settles() {
        assert_eq!(next_status(Overdue, Paid), Some(Paid));
    }

    // =========================================================================
    // REC-L04: overdue then stale pending replay - must stay overdue
    // =========================================================================
    #[test]
    fn test_overdue_ignores_stale_pending() {
        assert_eq!(next_status(Overdue, Pending), None);
    }

    // =========================================================================
    // REC-L05: webhook/poller race is order-independent
    // =========================================================================
    #[test]
    fn test_merge_is_order_independent_for_terminal_state() {
        // pending -> paid -> overdue and pending -> overdue -> paid
        // must both land on paid.
        let path_a = [Paid, Overdue];
        let path_b = [Overdue, Paid];

        for path in [path_a, path_b] {
            let mut state = Pending;
            for incoming in path {
                if let Some(next) = next_status(state, incoming) {
                    state = next;
                }
            }
            assert_eq!(state, Paid);
        }
    }
}

#[cfg(test)]
mod tier_resolution_tests {
    use crate::events::{payment_reference, resolve_tier, DEFAULT_ASSUMED_TIER};
    use galeria_shared::SubscriptionTier;
    use uuid::Uuid;

    // =========================================================================
    // REC-T01: structured reference beats everything
    // =========================================================================
    #[test]
    fn test_reference_is_authoritative() {
        let reference = payment_reference(SubscriptionTier::Plus, Uuid::new_v4());
        let tier = resolve_tier(Some(&reference), Some("assinatura lite")).unwrap();
        assert_eq!(tier, SubscriptionTier::Plus);
    }

    // =========================================================================
    // REC-T02: missing reference falls back to description scan
    // =========================================================================
    #[test]
    fn test_description_fallback() {
        let tier = resolve_tier(None, Some("Renovacao plano ULTRA mensal")).unwrap();
        assert_eq!(tier, SubscriptionTier::Ultra);
    }

    // =========================================================================
    // REC-T03: nothing resolvable - warning with assumed default
    // =========================================================================
    #[test]
    fn test_default_with_warning() {
        let warning = resolve_tier(None, None).unwrap_err();
        assert_eq!(warning.assumed, DEFAULT_ASSUMED_TIER);
    }

    // =========================================================================
    // REC-T04: garbage reference does not poison the description path
    // =========================================================================
    #[test]
    fn test_garbage_reference_ignored() {
        let tier = resolve_tier(Some("???"), Some("upgrade pro")).unwrap();
        assert_eq!(tier, SubscriptionTier::Pro);
    }

    // =========================================================================
    // REC-T05: "free" never resolves from a description
    // =========================================================================
    #[test]
    fn test_free_is_not_a_paid_resolution() {
        // A description mentioning "free trial of pro" must resolve to
        // pro, and a description with only "free" falls to the default.
        let tier = resolve_tier(None, Some("free trial of pro")).unwrap();
        assert_eq!(tier, SubscriptionTier::Pro);

        let warning = resolve_tier(None, Some("free account")).unwrap_err();
        assert_eq!(warning.assumed, DEFAULT_ASSUMED_TIER);
    }

    // =========================================================================
    // REC-T06: description with two tier names resolves to the higher
    // =========================================================================
    #[test]
    fn test_highest_tier_wins_ambiguous_description() {
        let tier = resolve_tier(None, Some("upgrade de lite para ultra")).unwrap();
        assert_eq!(tier, SubscriptionTier::Ultra);
    }

    // =========================================================================
    // REC-T07: tier name embedded in a longer word does not resolve
    // =========================================================================
    #[test]
    fn test_embedded_tier_name_does_not_over_grant() {
        // "produto" contains "pro" but is not a tier purchase.
        let warning = resolve_tier(None, Some("Compra de produto digital")).unwrap_err();
        assert_eq!(warning.assumed, DEFAULT_ASSUMED_TIER);
    }
}

#[cfg(test)]
mod renewal_window_tests {
    use crate::subscriptions::{renewal_period, RENEWAL_PERIOD_DAYS};
    use time::macros::datetime;
    use time::Duration;

    // =========================================================================
    // REC-R01: window is exactly 30 days
    // =========================================================================
    #[test]
    fn test_window_length() {
        let now = datetime!(2026-02-01 00:00 UTC);
        let (start, end) = renewal_period(now);
        assert_eq!(end - start, Duration::days(RENEWAL_PERIOD_DAYS));
    }

    // =========================================================================
    // REC-R02: window is anchored on confirmation time, not period end
    // =========================================================================
    #[test]
    fn test_no_stacking_on_early_renewal() {
        // Existing period ends in 10 days; a renewal confirmed now must
        // yield now+30, forfeiting the unused 10 days.
        let now = datetime!(2026-08-30 12:00 UTC);
        let existing_end = now + Duration::days(10);
        let (_, new_end) = renewal_period(now);
        assert_eq!(new_end, now + Duration::days(30));
        assert!(new_end - existing_end < Duration::days(30));
    }

    // =========================================================================
    // REC-R03: leap-day anchored renewal stays well-formed
    // =========================================================================
    #[test]
    fn test_leap_day_renewal() {
        let now = datetime!(2028-02-29 10:00 UTC);
        let (_, end) = renewal_period(now);
        assert_eq!(end, datetime!(2028-03-30 10:00 UTC));
    }
}

#[cfg(test)]
mod quota_boundary_tests {
    use crate::quota::{count_distinct_today_fallback, reference_local_date};
    use time::macros::{date, datetime};
    use uuid::Uuid;

    // =========================================================================
    // REC-Q01: three downloads of A plus one of B count as 2
    // =========================================================================
    #[test]
    fn test_dedup_by_resource() {
        let now = datetime!(2026-08-30 20:00 UTC);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![
            (a, datetime!(2026-08-30 14:00 UTC)),
            (a, datetime!(2026-08-30 15:00 UTC)),
            (a, datetime!(2026-08-30 16:00 UTC)),
            (b, datetime!(2026-08-30 17:00 UTC)),
        ];
        assert_eq!(count_distinct_today_fallback(&rows, now), 2);
    }

    // =========================================================================
    // REC-Q02: 23:59 / 00:01 reference-time straddle = two days
    // =========================================================================
    #[test]
    fn test_reference_midnight_boundary() {
        let resource = Uuid::new_v4();
        let late = datetime!(2026-09-01 02:59 UTC); // 23:59 UTC-3 Aug 31
        let early = datetime!(2026-09-01 03:01 UTC); // 00:01 UTC-3 Sep 1
        assert_eq!(reference_local_date(late), date!(2026-08-31));
        assert_eq!(reference_local_date(early), date!(2026-09-01));

        let rows = vec![(resource, late), (resource, early)];
        assert_eq!(count_distinct_today_fallback(&rows, late), 1);
        assert_eq!(count_distinct_today_fallback(&rows, early), 1);
    }

    // =========================================================================
    // REC-Q03: UTC midnight is NOT a quota boundary
    // =========================================================================
    #[test]
    fn test_utc_midnight_is_not_a_boundary() {
        let resource = Uuid::new_v4();
        // 23:30 UTC and 00:30 UTC next day are both the same UTC-3 date.
        let rows = vec![
            (resource, datetime!(2026-08-30 23:30 UTC)),
            (resource, datetime!(2026-08-31 00:30 UTC)),
        ];
        assert_eq!(
            reference_local_date(datetime!(2026-08-30 23:30 UTC)),
            reference_local_date(datetime!(2026-08-31 00:30 UTC))
        );
        assert_eq!(
            count_distinct_today_fallback(&rows, datetime!(2026-08-31 00:30 UTC)),
            1
        );
    }

    // =========================================================================
    // REC-Q04: empty history
    // =========================================================================
    #[test]
    fn test_empty_history_counts_zero() {
        assert_eq!(
            count_distinct_today_fallback(&[], datetime!(2026-08-30 12:00 UTC)),
            0
        );
    }

    // =========================================================================
    // REC-Q05: free-tier end-to-end arithmetic
    // =========================================================================
    #[test]
    fn test_free_tier_single_download_exhausts_quota() {
        use galeria_shared::SubscriptionTier;
        let limit = SubscriptionTier::Free.daily_download_limit();
        let now = datetime!(2026-08-30 12:00 UTC);
        let r1 = Uuid::new_v4();

        let rows = vec![(r1, now)];
        let current = count_distinct_today_fallback(&rows, now);
        assert_eq!(current, 1);
        assert!(current >= limit, "one download exhausts the free quota");

        // Re-downloading R1 the same day still reports current=1.
        let rows = vec![(r1, now), (r1, now + time::Duration::hours(2))];
        assert_eq!(count_distinct_today_fallback(&rows, now), 1);
    }

    // =========================================================================
    // REC-Q06: year boundary in reference time
    // =========================================================================
    #[test]
    fn test_year_boundary() {
        // 01:00 UTC on Jan 1 is still Dec 31 in UTC-3.
        let ts = datetime!(2027-01-01 01:00 UTC);
        assert_eq!(reference_local_date(ts), date!(2026-12-31));
    }
}

#[cfg(test)]
mod event_parsing_tests {
    use crate::events::{EventKind, GatewayEvent};

    // =========================================================================
    // REC-E01: full payment payload round-trips
    // =========================================================================
    #[test]
    fn test_confirmed_payment_event() {
        let raw = r#"{
            "event": "PAYMENT_CONFIRMED",
            "payment": {
                "id": "pay_42",
                "customer": "cus_7",
                "value": 49.90,
                "netValue": 47.65,
                "billingType": "CREDIT_CARD",
                "status": "CONFIRMED",
                "description": "Assinatura plus",
                "externalReference": "premium:plus:3fa85f64-5717-4562-b3fc-2c963f66afa6"
            }
        }"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event, EventKind::PaymentConfirmed);
        let payment = event.payment.unwrap();
        assert_eq!(payment.gross_cents(), 4990);
        assert_eq!(payment.net_cents(), 4765);
    }

    // =========================================================================
    // REC-E02: subscription deletion payload
    // =========================================================================
    #[test]
    fn test_subscription_deleted_event() {
        let raw = r#"{
            "event": "SUBSCRIPTION_DELETED",
            "subscription": {
                "id": "sub_9",
                "customer": "cus_7",
                "value": 29.90,
                "billingType": "CREDIT_CARD",
                "cycle": "MONTHLY",
                "status": "DELETED"
            }
        }"#;
        let event: GatewayEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event, EventKind::SubscriptionDeleted);
        assert!(event.subscription.is_some());
        assert!(event.payment.is_none());
    }

    // =========================================================================
    // REC-E03: unknown event kind is preserved, not rejected
    // =========================================================================
    #[test]
    fn test_unknown_event_is_other() {
        let event: GatewayEvent =
            serde_json::from_str(r#"{"event": "PAYMENT_SPLIT_DIVERGENCE_BLOCK"}"#).unwrap();
        match event.event {
            EventKind::Other(kind) => assert_eq!(kind, "PAYMENT_SPLIT_DIVERGENCE_BLOCK"),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    // =========================================================================
    // REC-E04: payment event missing its payment body is parseable
    // =========================================================================
    #[test]
    fn test_payment_event_without_payment_body() {
        // The processor turns this into a skip; parsing must not fail.
        let event: GatewayEvent = serde_json::from_str(r#"{"event": "PAYMENT_OVERDUE"}"#).unwrap();
        assert_eq!(event.event, EventKind::PaymentOverdue);
        assert!(event.payment.is_none());
    }
}
