//! Subscription billing data model
//!
//! Row types for the tables the reconciliation engine touches, plus the
//! closed status enums persisted as TEXT. Status columns stay `String` on
//! the row structs; logic converts through the enums' `as_str`/`from_str`
//! mappings.

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "suspended" => SubscriptionStatus::Suspended,
            _ => SubscriptionStatus::Cancelled,
        }
    }
}

/// Payment record status
///
/// State machine: `pending -> completed | failed`, exactly once. Terminal
/// records are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }

    /// A terminal record may never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// Store license status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Suspended,
    Cancelled,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Suspended => "suspended",
            LicenseStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => LicenseStatus::Active,
            "suspended" => LicenseStatus::Suspended,
            _ => LicenseStatus::Cancelled,
        }
    }
}

/// Plan billing cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnually,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Daily => "daily",
            BillingInterval::Weekly => "weekly",
            BillingInterval::Monthly => "monthly",
            BillingInterval::Quarterly => "quarterly",
            BillingInterval::SemiAnnually => "semi_annually",
            BillingInterval::Yearly => "yearly",
        }
    }

    /// Unknown or missing intervals default to monthly.
    pub fn from_str(s: &str) -> Self {
        match s {
            "daily" => BillingInterval::Daily,
            "weekly" => BillingInterval::Weekly,
            "quarterly" => BillingInterval::Quarterly,
            "semi_annually" => BillingInterval::SemiAnnually,
            "yearly" => BillingInterval::Yearly,
            _ => BillingInterval::Monthly,
        }
    }

    /// Advance a billing date by one interval.
    ///
    /// Month-based intervals use calendar arithmetic with day-of-month
    /// clamping (Jan 31 + 1 month = Feb 29 in a leap year).
    pub fn advance(&self, from: OffsetDateTime) -> OffsetDateTime {
        match self {
            BillingInterval::Daily => from + time::Duration::days(1),
            BillingInterval::Weekly => from + time::Duration::weeks(1),
            BillingInterval::Monthly => add_months(from, 1),
            BillingInterval::Quarterly => add_months(from, 3),
            BillingInterval::SemiAnnually => add_months(from, 6),
            BillingInterval::Yearly => add_months(from, 12),
        }
    }
}

/// Calendar month addition with day clamping.
fn add_months(from: OffsetDateTime, months: i32) -> OffsetDateTime {
    let date = from.date();
    let zero_based = date.year() * 12 + (date.month() as i32 - 1) + months;
    let year = zero_based.div_euclid(12);
    let month =
        Month::try_from((zero_based.rem_euclid(12) + 1) as u8).unwrap_or(date.month());
    let day = date.day().min(time::util::days_in_month(month, year));

    Date::from_calendar_date(year, month, day)
        .map(|d| from.replace_date(d))
        .unwrap_or(from)
}

/// Payment gateway flavor a merchant is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayType {
    Midtrans,
    Xendit,
    /// Test/integration path with no signature verification
    Generic,
}

impl GatewayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayType::Midtrans => "midtrans",
            GatewayType::Xendit => "xendit",
            GatewayType::Generic => "generic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "midtrans" => Some(GatewayType::Midtrans),
            "xendit" => Some(GatewayType::Xendit),
            "generic" => Some(GatewayType::Generic),
            _ => None,
        }
    }
}

/// A client's recurring billing relationship with the platform
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientSubscription {
    pub id: Uuid,
    pub client_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: OffsetDateTime,
    pub next_billing_date: Option<OffsetDateTime>,
    pub last_billing_attempt: Option<OffsetDateTime>,
    pub billing_failure_count: i32,
    pub payment_method: Option<String>,
    pub suspended_at: Option<OffsetDateTime>,
    pub billing_metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ClientSubscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status)
    }
}

/// One payment attempt against a subscription
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionPaymentRecord {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_url: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SubscriptionPaymentRecord {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status)
    }
}

/// Billing plan; read-only to this core
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub billing_interval: String,
}

impl Plan {
    pub fn interval(&self) -> BillingInterval {
        BillingInterval::from_str(&self.billing_interval)
    }
}

/// Per-client gateway credential set
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Merchant {
    pub id: Uuid,
    pub client_id: Uuid,
    pub gateway_type: String,
    pub server_key: String,
    pub client_key: Option<String>,
    pub callback_token: Option<String>,
    pub is_active: bool,
    pub supports_subscription: bool,
}

/// Paying tenant; read-only to this core
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn status_round_trips() {
        for status in [
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Suspended,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), status);
        }

        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn unknown_interval_defaults_to_monthly() {
        assert_eq!(BillingInterval::from_str(""), BillingInterval::Monthly);
        assert_eq!(
            BillingInterval::from_str("biweekly"),
            BillingInterval::Monthly
        );
    }

    #[test]
    fn advance_by_each_interval() {
        let from = datetime!(2024-01-01 00:00 UTC);

        assert_eq!(
            BillingInterval::Daily.advance(from),
            datetime!(2024-01-02 00:00 UTC)
        );
        assert_eq!(
            BillingInterval::Weekly.advance(from),
            datetime!(2024-01-08 00:00 UTC)
        );
        assert_eq!(
            BillingInterval::Monthly.advance(from),
            datetime!(2024-02-01 00:00 UTC)
        );
        assert_eq!(
            BillingInterval::Quarterly.advance(from),
            datetime!(2024-04-01 00:00 UTC)
        );
        assert_eq!(
            BillingInterval::SemiAnnually.advance(from),
            datetime!(2024-07-01 00:00 UTC)
        );
        assert_eq!(
            BillingInterval::Yearly.advance(from),
            datetime!(2025-01-01 00:00 UTC)
        );
    }

    #[test]
    fn monthly_advance_clamps_to_month_end() {
        assert_eq!(
            BillingInterval::Monthly.advance(datetime!(2024-01-31 10:30 UTC)),
            datetime!(2024-02-29 10:30 UTC)
        );
        assert_eq!(
            BillingInterval::Monthly.advance(datetime!(2023-01-31 00:00 UTC)),
            datetime!(2023-02-28 00:00 UTC)
        );
    }

    #[test]
    fn yearly_advance_handles_leap_day() {
        assert_eq!(
            BillingInterval::Yearly.advance(datetime!(2024-02-29 00:00 UTC)),
            datetime!(2025-02-28 00:00 UTC)
        );
    }

    #[test]
    fn monthly_advance_crosses_year_boundary() {
        assert_eq!(
            BillingInterval::Monthly.advance(datetime!(2024-12-15 08:00 UTC)),
            datetime!(2025-01-15 08:00 UTC)
        );
    }
}
