// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! TokoPOS Billing Module
//!
//! Subscription payment reconciliation for the POS platform: gateway
//! webhook verification, payment-attempt bookkeeping, subscription state
//! transitions with license cascades, and the renewal sweep.
//!
//! ## Features
//!
//! - **Gateway Adapters**: Midtrans, Xendit, and a generic test path -
//!   signature/token verification and status normalization
//! - **Charge Origination**: outbound charge creation per merchant gateway
//! - **Reconciliation**: exactly-once pending -> terminal transitions with
//!   row-level locking and license cascades
//! - **Renewal Sweep**: finds due subscriptions and initiates payments
//! - **Email Notifications**: payment success/failure, suspension
//! - **Invariants**: runnable consistency checks over the billing tables

pub mod config;
pub mod email;
pub mod error;
pub mod events;
pub mod gateway;
pub mod invariants;
pub mod models;
pub mod payments;
pub mod renewals;


// Config
pub use config::BillingConfig;

// Email
pub use email::BillingEmailService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEventLogger, BillingEventType};

// Gateway
pub use gateway::{
    ChargeCreation, ChargeRequest, GenericAdapter, GenericCallback, MidtransAdapter,
    MidtransNotification, PaymentGatewayManager, WebhookOutcome, XenditAdapter, XenditCallback,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Models
pub use models::{
    BillingInterval, Client, ClientSubscription, GatewayType, LicenseStatus, Merchant,
    PaymentStatus, Plan, SubscriptionPaymentRecord, SubscriptionStatus,
};

// Payments
pub use payments::{PaymentInitiation, SubscriptionPaymentService};

// Renewals
pub use renewals::{RenewalService, RenewalSweepSummary};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub config: BillingConfig,
    pub gateway: PaymentGatewayManager,
    pub email: BillingEmailService,
    pub payments: SubscriptionPaymentService,
    pub renewals: RenewalService,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Self::new(BillingConfig::from_env()?, pool)
    }

    /// Create a new billing service with explicit config
    pub fn new(config: BillingConfig, pool: PgPool) -> BillingResult<Self> {
        let gateway = PaymentGatewayManager::new(config.clone())?;
        let email = BillingEmailService::from_env();
        let payments =
            SubscriptionPaymentService::new(pool.clone(), gateway.clone(), email.clone());
        let renewals = RenewalService::new(pool.clone(), payments.clone());

        Ok(Self {
            config,
            gateway,
            email,
            payments,
            renewals,
            invariants: InvariantChecker::new(pool),
        })
    }
}
