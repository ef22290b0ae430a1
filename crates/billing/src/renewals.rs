//! Renewal scheduling
//!
//! Periodic sweep that finds subscriptions due for billing and initiates a
//! new payment attempt for each, plus the reconciliation sweep that expires
//! pending payment records the gateways never resolved.

use serde_json::json;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};
use crate::models::ClientSubscription;
use crate::payments::SubscriptionPaymentService;

/// Attempts per subscription within one sweep (initial call + retries)
const INITIATION_ATTEMPTS: usize = 3;

/// Outcome counts for one renewal sweep
#[derive(Debug, Clone, Default)]
pub struct RenewalSweepSummary {
    pub due: usize,
    pub initiated: usize,
    pub failed: usize,
}

/// Finds due subscriptions and drives payment initiation
#[derive(Clone)]
pub struct RenewalService {
    pool: PgPool,
    payments: SubscriptionPaymentService,
    events: BillingEventLogger,
}

impl RenewalService {
    pub fn new(pool: PgPool, payments: SubscriptionPaymentService) -> Self {
        let events = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            payments,
            events,
        }
    }

    /// Subscriptions eligible for billing: active or past_due, with a
    /// next_billing_date that is set and not in the future.
    pub async fn due_subscriptions(
        &self,
        now: OffsetDateTime,
    ) -> BillingResult<Vec<ClientSubscription>> {
        let due = sqlx::query_as(
            r#"
            SELECT * FROM client_subscriptions
            WHERE status IN ('active', 'past_due')
              AND next_billing_date IS NOT NULL
              AND next_billing_date <= $1
            ORDER BY next_billing_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(due)
    }

    /// Run one renewal sweep.
    ///
    /// Each due subscription gets up to three initiation attempts with
    /// backoff; only transient errors are retried. A subscription that
    /// exhausts its attempts is marked past_due with the attempt stamped -
    /// the sweep never touches billing_failure_count, which is reserved for
    /// gateway-confirmed failures. One subscription's failure never aborts
    /// the sweep.
    pub async fn run_sweep(&self) -> RenewalSweepSummary {
        let now = OffsetDateTime::now_utc();
        let due = match self.due_subscriptions(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query due subscriptions");
                return RenewalSweepSummary::default();
            }
        };

        let mut summary = RenewalSweepSummary {
            due: due.len(),
            ..Default::default()
        };

        for subscription in due {
            // 1s then 2s between attempts, jittered
            let strategy = ExponentialBackoff::from_millis(2)
                .factor(500)
                .map(jitter)
                .take(INITIATION_ATTEMPTS - 1);

            let result = RetryIf::spawn(
                strategy,
                || self.payments.initiate_payment(subscription.id),
                |e: &BillingError| e.is_transient(),
            )
            .await;

            match result {
                Ok(initiation) => {
                    summary.initiated += 1;
                    tracing::info!(
                        subscription_id = %subscription.id,
                        payment_record_id = %initiation.record.id,
                        "Renewal payment initiated"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    if let Err(mark_err) = self.mark_past_due(subscription.id, now).await {
                        tracing::error!(
                            subscription_id = %subscription.id,
                            error = %mark_err,
                            "Failed to mark subscription past_due after initiation failure"
                        );
                    }

                    if let Err(log_err) = self
                        .events
                        .log(
                            Some(subscription.id),
                            BillingEventType::RenewalSweepFailed,
                            json!({ "error": e.to_string() }),
                        )
                        .await
                    {
                        tracing::warn!(error = %log_err, "Failed to log renewal sweep failure");
                    }

                    tracing::error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Renewal initiation failed after retries"
                    );
                }
            }
        }

        tracing::info!(
            due = summary.due,
            initiated = summary.initiated,
            failed = summary.failed,
            "Renewal sweep complete"
        );

        summary
    }

    /// Expire pending payment records the gateways never resolved.
    ///
    /// Touches only the payment records: no failure-count increment and no
    /// subscription status change, since nothing was gateway-confirmed.
    pub async fn expire_stale_pending(&self, older_than: std::time::Duration) -> BillingResult<u64> {
        let cutoff = OffsetDateTime::now_utc() - older_than;

        let expired: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE subscription_payment_records
            SET status = 'failed',
                failure_reason = 'Expired without gateway confirmation',
                updated_at = NOW()
            WHERE status = 'pending' AND created_at < $1
            RETURNING id, subscription_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for (record_id, subscription_id) in &expired {
            if let Err(e) = self
                .events
                .log(
                    Some(*subscription_id),
                    BillingEventType::PaymentExpired,
                    json!({ "payment_record_id": record_id }),
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to log payment expired event");
            }
        }

        if !expired.is_empty() {
            tracing::warn!(
                expired = expired.len(),
                "Expired stale pending payment records"
            );
        }

        Ok(expired.len() as u64)
    }

    async fn mark_past_due(&self, subscription_id: Uuid, now: OffsetDateTime) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE client_subscriptions
            SET status = 'past_due', last_billing_attempt = $1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
