#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Galeria Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription expiration sweep (hourly, override via SWEEP_CRON)
//! - Expiry notices for subscriptions ending one day ahead (daily at 12:00 UTC)
//! - Reconciliation of unsettled ledger entries against the gateway
//!   (nightly at 3:00 UTC)

use std::sync::Arc;
use std::time::Duration;

use galeria_billing::{BillingService, SweepReport};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Default expiration sweep schedule: top of every hour.
///
/// This interval doubles as the grace window for lapsed subscriptions,
/// so shortening it via SWEEP_CRON tightens how long an overdue
/// subscriber keeps access.
const DEFAULT_SWEEP_CRON: &str = "0 0 * * * *";

/// How far back the nightly reconciliation looks for unsettled payments.
const RECONCILE_LOOKBACK_DAYS: i32 = 30;

fn log_sweep_report(job: &str, report: &SweepReport) {
    info!(
        job = job,
        processed = report.processed,
        renewed = report.renewed,
        blocked = report.blocked,
        errors = report.errors.len(),
        "Sweep complete"
    );
    for e in &report.errors {
        error!(job = job, error = %e, "Sweep entry failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Galeria Worker");

    // Create database pool
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = galeria_shared::create_pool(&database_url).await?;
    info!("Database pool created");

    // Create billing service
    let billing = match BillingService::from_env(pool.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            // If the gateway isn't configured, run in minimal mode
            warn!(error = %e, "Failed to create billing service - running in minimal mode");
            info!("Worker running without gateway integration");

            // Keep running with minimal functionality
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Expiration sweep (hourly by default)
    // Lapsed subscriptions lose entitlement here, then either renew via a
    // fresh gateway charge or expire for good.
    let sweep_cron =
        std::env::var("SWEEP_CRON").unwrap_or_else(|_| DEFAULT_SWEEP_CRON.to_string());
    let sweep_billing = billing.clone();
    scheduler
        .add(Job::new_async(sweep_cron.as_str(), move |_uuid, _l| {
            let billing = sweep_billing.clone();
            Box::pin(async move {
                info!("Running scheduled expiration sweep");
                match billing.sweep.run_expiration().await {
                    Ok(report) => log_sweep_report("expiration", &report),
                    Err(e) => error!(error = %e, "Expiration sweep failed"),
                }
            })
        })?)
        .await?;
    info!(cron = %sweep_cron, "Scheduled: Expiration sweep");

    // Job 2: Expiry notices (daily at 12:00 UTC)
    let notice_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 12 * * *", move |_uuid, _l| {
            let billing = notice_billing.clone();
            Box::pin(async move {
                info!("Running scheduled expiry-notice sweep");
                match billing.sweep.run_expiry_notices().await {
                    Ok(report) => log_sweep_report("expiry_notices", &report),
                    Err(e) => error!(error = %e, "Expiry-notice sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Expiry notices (12:00 UTC)");

    // Job 3: Reconcile unsettled payments (nightly at 3:00 UTC)
    // Picks up webhook deliveries that were dropped or failed processing:
    // every pending or overdue ledger entry is re-fetched from the gateway
    // and pushed through the same path a confirmed webhook would take.
    let reconcile_pool = pool.clone();
    let reconcile_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = reconcile_pool.clone();
            let billing = reconcile_billing.clone();
            Box::pin(async move {
                info!("Running nightly reconciliation of unsettled payments");

                let payment_ids: Vec<(String,)> = match sqlx::query_as(
                    r#"
                    SELECT gateway_payment_id
                    FROM transactions
                    WHERE status IN ('pending', 'overdue')
                      AND created_at > NOW() - make_interval(days => $1)
                    ORDER BY created_at
                    "#,
                )
                .bind(RECONCILE_LOOKBACK_DAYS)
                .fetch_all(&pool)
                .await
                {
                    Ok(ids) => ids,
                    Err(e) => {
                        error!(error = %e, "Failed to query unsettled payments, skipping run");
                        return;
                    }
                };

                let total = payment_ids.len();
                let mut settled = 0;
                let mut errors = 0;

                for (payment_id,) in payment_ids {
                    match billing.reconcile.reconcile_payment(&payment_id).await {
                        Ok(outcome) => {
                            if outcome.is_premium {
                                settled += 1;
                            }
                            info!(
                                payment_id = %payment_id,
                                gateway_status = %outcome.gateway_status,
                                processed = %outcome.processed,
                                "Payment reconciled"
                            );
                        }
                        Err(e) => {
                            error!(payment_id = %payment_id, error = %e, "Reconciliation failed");
                            errors += 1;
                        }
                    }
                }

                info!(
                    total = total,
                    settled = settled,
                    errors = errors,
                    "Nightly reconciliation complete"
                );
            })
        })?)
        .await?;
    info!("Scheduled: Nightly reconciliation (3:00 UTC)");

    // Job 4: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    scheduler.start().await?;
    info!("Worker scheduler started");

    // Keep the worker running
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
