//! Subscription payment reconciliation
//!
//! Records payment attempts, applies gateway-confirmed outcomes to
//! subscription state, and cascades license state to the client's stores.
//!
//! Every transition runs in a single transaction with `FOR UPDATE` locks on
//! the payment record and the owning subscription; concurrent resolutions
//! for the same subscription serialize on the row lock. A record may leave
//! `pending` exactly once - duplicate webhook deliveries for an already
//! resolved record are acknowledged without touching anything.
//!
//! Notification sends happen strictly after commit and never roll back or
//! re-run a transition.

use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};
use crate::gateway::{ChargeRequest, PaymentGatewayManager};
use crate::models::{
    Client, ClientSubscription, LicenseStatus, Merchant, PaymentStatus, Plan,
    SubscriptionPaymentRecord, SubscriptionStatus,
};

/// Failure count at which a subscription drops to past_due
pub const PAST_DUE_THRESHOLD: i32 = 3;
/// Failure count at which a subscription (and its licenses) suspend
pub const SUSPENSION_THRESHOLD: i32 = 5;

/// Result of initiating a payment attempt
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub record: SubscriptionPaymentRecord,
    pub payment_url: Option<String>,
}

/// Escalation applied after a gateway-confirmed failure.
///
/// Thresholds are cumulative and only reset on a successful payment; below
/// the past_due threshold the status is left alone.
pub(crate) fn escalated_status(
    current: SubscriptionStatus,
    failure_count: i32,
) -> SubscriptionStatus {
    if failure_count >= SUSPENSION_THRESHOLD {
        SubscriptionStatus::Suspended
    } else if failure_count >= PAST_DUE_THRESHOLD {
        SubscriptionStatus::PastDue
    } else {
        current
    }
}

/// Base date the next billing date is computed from: the subscription's
/// current next_billing_date, or now when it was never set.
pub(crate) fn renewal_base(
    next_billing_date: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> OffsetDateTime {
    next_billing_date.unwrap_or(now)
}

/// The reconciliation engine
#[derive(Clone)]
pub struct SubscriptionPaymentService {
    pool: PgPool,
    gateway: PaymentGatewayManager,
    email: BillingEmailService,
    events: BillingEventLogger,
}

impl SubscriptionPaymentService {
    pub fn new(pool: PgPool, gateway: PaymentGatewayManager, email: BillingEmailService) -> Self {
        let events = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            gateway,
            email,
            events,
        }
    }

    /// Initiate a payment attempt for a subscription.
    ///
    /// The outbound charge is created before any local transaction is
    /// opened. A successful charge persists a `pending` record keyed by the
    /// returned transaction id; a failed charge persists a `failed` record
    /// with no transaction id and re-raises the original error so the
    /// caller (typically the renewal sweep) can escalate.
    pub async fn initiate_payment(&self, subscription_id: Uuid) -> BillingResult<PaymentInitiation> {
        let subscription: ClientSubscription =
            sqlx::query_as("SELECT * FROM client_subscriptions WHERE id = $1")
                .bind(subscription_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(BillingError::SubscriptionNotFound(subscription_id))?;

        let plan: Plan = sqlx::query_as(
            "SELECT id, name, price, currency, billing_interval FROM plans WHERE id = $1",
        )
        .bind(subscription.plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BillingError::PlanNotFound(subscription.plan_id))?;

        let client: Client =
            sqlx::query_as("SELECT id, name, email, phone FROM clients WHERE id = $1")
                .bind(subscription.client_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(BillingError::ClientNotFound(subscription.client_id))?;

        let merchant = sqlx::query_as::<_, Merchant>(
            r#"
            SELECT id, client_id, gateway_type, server_key, client_key, callback_token,
                   is_active, supports_subscription
            FROM merchants
            WHERE client_id = $1 AND is_active AND supports_subscription
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(subscription.client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BillingError::NoActiveMerchant(subscription.client_id))?;

        let request = ChargeRequest {
            amount: plan.price,
            currency: plan.currency.clone(),
            description: format!("{} subscription renewal", plan.name),
            customer_name: client.name.clone(),
            customer_email: client.email.clone(),
            customer_phone: client.phone.clone(),
            metadata: json!({
                "subscription_id": subscription.id,
                "client_id": subscription.client_id,
                "plan_id": subscription.plan_id,
                "period_start": subscription.current_period_start.to_string(),
                "period_end": subscription.current_period_end.to_string(),
            }),
        };

        let charge = match self.gateway.create_charge(&merchant, &request).await {
            Ok(charge) => charge,
            Err(e) => {
                self.record_initiation_failure(&subscription, &plan, &merchant, &e)
                    .await;
                return Err(e);
            }
        };

        let mut tx = self.pool.begin().await?;
        let record: SubscriptionPaymentRecord = sqlx::query_as(
            r#"
            INSERT INTO subscription_payment_records
                (subscription_id, amount, currency, status, payment_method,
                 transaction_id, payment_url, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .bind(plan.price)
        .bind(&plan.currency)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&merchant.gateway_type)
        .bind(&charge.transaction_id)
        .bind(&charge.payment_url)
        .bind(request.metadata.clone())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(e) = self
            .events
            .log(
                Some(subscription.id),
                BillingEventType::PaymentInitiated,
                json!({
                    "payment_record_id": record.id,
                    "transaction_id": charge.transaction_id,
                    "amount": plan.price,
                    "gateway": merchant.gateway_type,
                }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment initiated event");
        }

        tracing::info!(
            subscription_id = %subscription.id,
            transaction_id = %charge.transaction_id,
            amount = plan.price,
            gateway = %merchant.gateway_type,
            "Payment attempt initiated"
        );

        Ok(PaymentInitiation {
            record,
            payment_url: charge.payment_url,
        })
    }

    /// Persist a failed record for a charge that never got off the ground.
    /// Best-effort: the original charge error is what the caller sees.
    async fn record_initiation_failure(
        &self,
        subscription: &ClientSubscription,
        plan: &Plan,
        merchant: &Merchant,
        error: &BillingError,
    ) {
        let insert = sqlx::query(
            r#"
            INSERT INTO subscription_payment_records
                (subscription_id, amount, currency, status, payment_method, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(subscription.id)
        .bind(plan.price)
        .bind(&plan.currency)
        .bind(PaymentStatus::Failed.as_str())
        .bind(&merchant.gateway_type)
        .bind(error.to_string())
        .execute(&self.pool)
        .await;

        if let Err(e) = insert {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to persist charge initiation failure record"
            );
        }

        if let Err(e) = self
            .events
            .log(
                Some(subscription.id),
                BillingEventType::PaymentInitiationFailed,
                json!({ "error": error.to_string() }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log initiation failure event");
        }

        tracing::error!(
            subscription_id = %subscription.id,
            gateway = %merchant.gateway_type,
            error = %error,
            "Charge creation failed"
        );
    }

    /// Apply a gateway-confirmed successful payment.
    ///
    /// Returns `false` without mutating anything when the transaction id is
    /// unknown or the record already left `pending` (duplicate delivery).
    pub async fn apply_success(
        &self,
        transaction_id: &str,
        raw_payload: &serde_json::Value,
    ) -> BillingResult<bool> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let Some(record) = self.lock_record(&mut tx, transaction_id).await? else {
            tracing::error!(
                transaction_id = %transaction_id,
                "Success webhook for unknown transaction"
            );
            return Ok(false);
        };

        if record.status().is_terminal() {
            tracing::warn!(
                transaction_id = %transaction_id,
                status = %record.status,
                "Duplicate webhook delivery for resolved payment record"
            );
            return Ok(false);
        }

        let subscription = self.lock_subscription(&mut tx, record.subscription_id).await?;

        let plan: Plan = sqlx::query_as(
            "SELECT id, name, price, currency, billing_interval FROM plans WHERE id = $1",
        )
        .bind(subscription.plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BillingError::PlanNotFound(subscription.plan_id))?;

        let base = renewal_base(subscription.next_billing_date, now);
        let next_billing_date = plan.interval().advance(base);

        sqlx::query(
            r#"
            UPDATE subscription_payment_records
            SET status = $1, paid_at = $2, gateway_response = $3, updated_at = $2
            WHERE id = $4
            "#,
        )
        .bind(PaymentStatus::Completed.as_str())
        .bind(now)
        .bind(raw_payload)
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE client_subscriptions
            SET status = $1,
                current_period_start = $2,
                current_period_end = $3,
                next_billing_date = $3,
                billing_failure_count = 0,
                suspended_at = NULL,
                billing_metadata = billing_metadata || $4::jsonb,
                updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(SubscriptionStatus::Active.as_str())
        .bind(base)
        .bind(next_billing_date)
        .bind(json!({
            "last_payment_record_id": record.id,
            "last_paid_at": now.to_string(),
        }))
        .bind(now)
        .bind(subscription.id)
        .execute(&mut *tx)
        .await?;

        // License cascade: every licensed store of the client follows the
        // subscription into the new period.
        let licenses = sqlx::query(
            r#"
            UPDATE store_licenses
            SET status = $1, expires_at = $2, suspended_at = NULL, updated_at = $3
            WHERE store_id IN (SELECT id FROM stores WHERE client_id = $4)
            "#,
        )
        .bind(LicenseStatus::Active.as_str())
        .bind(next_billing_date)
        .bind(now)
        .bind(subscription.client_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            transaction_id = %transaction_id,
            next_billing_date = %next_billing_date,
            licenses_renewed = licenses.rows_affected(),
            "Payment applied, subscription renewed"
        );

        if let Err(e) = self
            .events
            .log(
                Some(subscription.id),
                BillingEventType::PaymentCompleted,
                json!({
                    "payment_record_id": record.id,
                    "transaction_id": transaction_id,
                    "next_billing_date": next_billing_date.to_string(),
                    "licenses_renewed": licenses.rows_affected(),
                }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment completed event");
        }

        // Best-effort notification; never unwinds the committed transition.
        if let Ok(Some(client)) = self.load_client(subscription.client_id).await {
            if let Err(e) = self
                .email
                .send_payment_success(
                    &client.email,
                    &client.name,
                    record.amount,
                    &record.currency,
                    next_billing_date,
                )
                .await
            {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to send payment success notification"
                );
            }
        }

        Ok(true)
    }

    /// Apply a gateway-confirmed failed payment.
    ///
    /// Symmetric to [`apply_success`](Self::apply_success): unknown or
    /// already resolved records return `false` with no mutation. The
    /// failure count escalates the subscription at the past_due and
    /// suspension thresholds; crossing into suspended also suspends every
    /// store license of the client.
    pub async fn apply_failure(&self, transaction_id: &str, reason: &str) -> BillingResult<bool> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let Some(record) = self.lock_record(&mut tx, transaction_id).await? else {
            tracing::error!(
                transaction_id = %transaction_id,
                "Failure webhook for unknown transaction"
            );
            return Ok(false);
        };

        if record.status().is_terminal() {
            tracing::warn!(
                transaction_id = %transaction_id,
                status = %record.status,
                "Duplicate webhook delivery for resolved payment record"
            );
            return Ok(false);
        }

        let subscription = self.lock_subscription(&mut tx, record.subscription_id).await?;

        let failure_count = subscription.billing_failure_count + 1;
        let prior_status = subscription.status();
        let new_status = escalated_status(prior_status, failure_count);
        let newly_suspended =
            new_status == SubscriptionStatus::Suspended && prior_status != SubscriptionStatus::Suspended;

        sqlx::query(
            r#"
            UPDATE subscription_payment_records
            SET status = $1, failure_reason = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(PaymentStatus::Failed.as_str())
        .bind(reason)
        .bind(now)
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE client_subscriptions
            SET status = $1,
                billing_failure_count = $2,
                last_billing_attempt = $3,
                suspended_at = CASE WHEN $4 THEN $3 ELSE suspended_at END,
                updated_at = $3
            WHERE id = $5
            "#,
        )
        .bind(new_status.as_str())
        .bind(failure_count)
        .bind(now)
        .bind(newly_suspended)
        .bind(subscription.id)
        .execute(&mut *tx)
        .await?;

        let mut licenses_suspended = 0;
        if new_status == SubscriptionStatus::Suspended {
            let licenses = sqlx::query(
                r#"
                UPDATE store_licenses
                SET status = $1, suspended_at = $2, updated_at = $2
                WHERE store_id IN (SELECT id FROM stores WHERE client_id = $3)
                "#,
            )
            .bind(LicenseStatus::Suspended.as_str())
            .bind(now)
            .bind(subscription.client_id)
            .execute(&mut *tx)
            .await?;
            licenses_suspended = licenses.rows_affected();
        }

        tx.commit().await?;

        tracing::warn!(
            subscription_id = %subscription.id,
            transaction_id = %transaction_id,
            failure_count = failure_count,
            status = new_status.as_str(),
            reason = %reason,
            "Payment failure applied"
        );

        let event_type = if newly_suspended {
            BillingEventType::SubscriptionSuspended
        } else if new_status == SubscriptionStatus::PastDue
            && prior_status != SubscriptionStatus::PastDue
        {
            BillingEventType::SubscriptionPastDue
        } else {
            BillingEventType::PaymentFailed
        };
        if let Err(e) = self
            .events
            .log(
                Some(subscription.id),
                event_type,
                json!({
                    "payment_record_id": record.id,
                    "transaction_id": transaction_id,
                    "failure_count": failure_count,
                    "reason": reason,
                    "licenses_suspended": licenses_suspended,
                }),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment failure event");
        }

        if let Ok(Some(client)) = self.load_client(subscription.client_id).await {
            if let Err(e) = self
                .email
                .send_payment_failed(
                    &client.email,
                    &client.name,
                    record.amount,
                    &record.currency,
                    failure_count,
                    reason,
                )
                .await
            {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to send payment failure notification"
                );
            }

            if newly_suspended {
                if let Err(e) = self
                    .email
                    .send_subscription_suspended(&client.email, &client.name)
                    .await
                {
                    tracing::error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to send suspension notification"
                    );
                }
            }
        }

        Ok(true)
    }

    async fn lock_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: &str,
    ) -> BillingResult<Option<SubscriptionPaymentRecord>> {
        let record = sqlx::query_as(
            "SELECT * FROM subscription_payment_records WHERE transaction_id = $1 FOR UPDATE",
        )
        .bind(transaction_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(record)
    }

    async fn lock_subscription(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        subscription_id: Uuid,
    ) -> BillingResult<ClientSubscription> {
        let subscription = sqlx::query_as(
            "SELECT * FROM client_subscriptions WHERE id = $1 FOR UPDATE",
        )
        .bind(subscription_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(BillingError::SubscriptionNotFound(subscription_id))?;

        Ok(subscription)
    }

    async fn load_client(&self, client_id: Uuid) -> BillingResult<Option<Client>> {
        let client = sqlx::query_as("SELECT id, name, email, phone FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn escalation_thresholds() {
        // Below past_due: status unchanged
        assert_eq!(
            escalated_status(SubscriptionStatus::Active, 1),
            SubscriptionStatus::Active
        );
        assert_eq!(
            escalated_status(SubscriptionStatus::Active, 2),
            SubscriptionStatus::Active
        );

        // Third failure drops to past_due
        assert_eq!(
            escalated_status(SubscriptionStatus::Active, 3),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            escalated_status(SubscriptionStatus::PastDue, 4),
            SubscriptionStatus::PastDue
        );

        // Fifth failure suspends
        assert_eq!(
            escalated_status(SubscriptionStatus::PastDue, 5),
            SubscriptionStatus::Suspended
        );
        assert_eq!(
            escalated_status(SubscriptionStatus::Suspended, 7),
            SubscriptionStatus::Suspended
        );
    }

    #[test]
    fn renewal_base_prefers_existing_billing_date() {
        let now = datetime!(2024-01-05 12:00 UTC);
        let scheduled = datetime!(2024-01-01 00:00 UTC);

        // An overdue billing date stays the anchor so the period does not
        // drift with webhook latency.
        assert_eq!(renewal_base(Some(scheduled), now), scheduled);
        assert_eq!(renewal_base(None, now), now);
    }
}
