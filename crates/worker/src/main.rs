//! TokoPOS Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription renewal sweep (hourly)
//! - Stale pending payment reconciliation (every 6 hours)
//! - Billing invariant checks (daily at 5:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokopos_billing::BillingService;
use tracing::{error, info, warn};

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

    info!("Starting TokoPOS Worker");

    // Create database pool
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = tokopos_shared::create_pool(&database_url).await?;
    info!("Database pool created");

    // Create billing service
    let billing = match BillingService::from_env(pool.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            // Without gateway credentials there is nothing to sweep
            warn!(error = %e, "Failed to create billing service - running in minimal mode");

            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Renewal sweep (hourly at :07)
    // Finds subscriptions whose next_billing_date is due and initiates a
    // payment attempt for each
    let renewal_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 7 * * * *", move |_uuid, _l| {
            let billing = renewal_billing.clone();
            Box::pin(async move {
                info!("Running scheduled renewal sweep");
                let summary = billing.renewals.run_sweep().await;
                info!(
                    due = summary.due,
                    initiated = summary.initiated,
                    failed = summary.failed,
                    "Renewal sweep finished"
                );
            })
        })?)
        .await?;
    info!("Scheduled: Renewal sweep (hourly)");

    // Job 2: Stale pending reconciliation (every 6 hours at :23)
    // Expires pending payment records the gateways never resolved
    let expiry_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 23 */6 * * *", move |_uuid, _l| {
            let billing = expiry_billing.clone();
            Box::pin(async move {
                info!("Running stale pending payment reconciliation");
                let ttl = billing.config.pending_payment_ttl;
                match billing.renewals.expire_stale_pending(ttl).await {
                    Ok(expired) => {
                        info!(expired = expired, "Pending payment reconciliation complete")
                    }
                    Err(e) => error!(error = %e, "Pending payment reconciliation failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Stale pending reconciliation (every 6 hours)");

    // Job 3: Billing invariant checks (daily at 5:00 AM UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 5 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running billing invariant checks");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(checks = summary.checks_run, "All billing invariants hold")
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            error!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                description = %violation.description,
                                "Billing invariant violated"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Invariant check run failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily at 5:00 AM UTC)");

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
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("TokoPOS Worker started successfully with {} scheduled jobs", 4);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
