//! Billing event audit trail
//!
//! Append-only record of every billing mutation. Audit inserts are
//! best-effort at call sites; a failed insert is logged and never aborts
//! the transition it describes.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events recorded for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    PaymentInitiated,
    PaymentInitiationFailed,
    PaymentCompleted,
    PaymentFailed,
    PaymentExpired,
    SubscriptionPastDue,
    SubscriptionSuspended,
    RenewalSweepFailed,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::PaymentInitiated => "payment_initiated",
            BillingEventType::PaymentInitiationFailed => "payment_initiation_failed",
            BillingEventType::PaymentCompleted => "payment_completed",
            BillingEventType::PaymentFailed => "payment_failed",
            BillingEventType::PaymentExpired => "payment_expired",
            BillingEventType::SubscriptionPastDue => "subscription_past_due",
            BillingEventType::SubscriptionSuspended => "subscription_suspended",
            BillingEventType::RenewalSweepFailed => "renewal_sweep_failed",
        }
    }
}

/// Writes billing events to the audit table
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(
        &self,
        subscription_id: Option<Uuid>,
        event_type: BillingEventType,
        data: serde_json::Value,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events (subscription_id, event_type, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(subscription_id)
        .bind(event_type.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
