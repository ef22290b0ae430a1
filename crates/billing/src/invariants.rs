//! Billing Invariants Module
//!
//! Runnable consistency checks for the subscription billing system. These
//! can be run after any mutation or webhook replay to ensure the system is
//! in a valid state.
//!
//! Checks only read, never write; violations carry enough context to debug.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Subscription(s) affected
    pub subscription_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// Critical - system may be billing incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ActiveWithoutBillingDateRow {
    sub_id: Uuid,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PeriodOrderRow {
    sub_id: Uuid,
    next_billing_date: Option<OffsetDateTime>,
    current_period_start: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct CompletedWithoutPaidAtRow {
    record_id: Uuid,
    sub_id: Uuid,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LicenseDriftRow {
    sub_id: Uuid,
    license_id: Uuid,
    license_status: String,
    subscription_status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StalePendingRow {
    record_id: Uuid,
    sub_id: Uuid,
    created_at: OffsetDateTime,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_active_has_billing_date().await?);
        violations.extend(self.check_period_ordering().await?);
        violations.extend(self.check_completed_has_paid_at().await?);
        violations.extend(self.check_suspended_licenses_match().await?);
        violations.extend(self.check_stale_pending_records().await?);

        let checks_run = 5;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: an active subscription always has a next billing date.
    ///
    /// An active subscription without one can never come up in a renewal
    /// sweep and silently stops being billed.
    async fn check_active_has_billing_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ActiveWithoutBillingDateRow> = sqlx::query_as(
            r#"
            SELECT id AS sub_id, status
            FROM client_subscriptions
            WHERE status = 'active' AND next_billing_date IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_has_billing_date".to_string(),
                subscription_ids: vec![row.sub_id],
                description: "Active subscription has no next_billing_date".to_string(),
                context: serde_json::json!({ "status": row.status }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: next_billing_date never precedes the period start.
    async fn check_period_ordering(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PeriodOrderRow> = sqlx::query_as(
            r#"
            SELECT id AS sub_id, next_billing_date, current_period_start
            FROM client_subscriptions
            WHERE status = 'active'
              AND next_billing_date IS NOT NULL
              AND next_billing_date < current_period_start
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "period_ordering".to_string(),
                subscription_ids: vec![row.sub_id],
                description: "next_billing_date precedes current_period_start".to_string(),
                context: serde_json::json!({
                    "next_billing_date": row.next_billing_date.map(|d| d.to_string()),
                    "current_period_start": row.current_period_start.to_string(),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: completed payment records carry a paid_at stamp.
    async fn check_completed_has_paid_at(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CompletedWithoutPaidAtRow> = sqlx::query_as(
            r#"
            SELECT id AS record_id, subscription_id AS sub_id, status
            FROM subscription_payment_records
            WHERE status = 'completed' AND paid_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "completed_has_paid_at".to_string(),
                subscription_ids: vec![row.sub_id],
                description: "Completed payment record has no paid_at".to_string(),
                context: serde_json::json!({
                    "record_id": row.record_id,
                    "status": row.status,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: a suspended subscription has no active store licenses.
    ///
    /// Licenses move inside the same transaction as the subscription, so
    /// drift here means a cascade was lost.
    async fn check_suspended_licenses_match(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<LicenseDriftRow> = sqlx::query_as(
            r#"
            SELECT cs.id AS sub_id, sl.id AS license_id,
                   sl.status AS license_status, cs.status AS subscription_status
            FROM client_subscriptions cs
            JOIN stores s ON s.client_id = cs.client_id
            JOIN store_licenses sl ON sl.store_id = s.id
            WHERE cs.status = 'suspended' AND sl.status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "suspended_licenses_match".to_string(),
                subscription_ids: vec![row.sub_id],
                description: "Suspended subscription still has an active store license"
                    .to_string(),
                context: serde_json::json!({
                    "license_id": row.license_id,
                    "license_status": row.license_status,
                    "subscription_status": row.subscription_status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 5: pending payment records should resolve within 48 hours.
    ///
    /// The reconciliation sweep expires them at the configured TTL; records
    /// older than twice that window mean the sweep is not running.
    async fn check_stale_pending_records(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<StalePendingRow> = sqlx::query_as(
            r#"
            SELECT id AS record_id, subscription_id AS sub_id, created_at
            FROM subscription_payment_records
            WHERE status = 'pending' AND created_at < NOW() - INTERVAL '48 hours'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "stale_pending_records".to_string(),
                subscription_ids: vec![row.sub_id],
                description: "Pending payment record older than 48 hours".to_string(),
                context: serde_json::json!({
                    "record_id": row.record_id,
                    "created_at": row.created_at.to_string(),
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }
}
