//! Billing error types

use std::time::Duration;

use uuid::Uuid;

/// Errors from the subscription billing core
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Midtrans notification signature did not match the computed digest
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Xendit callback token did not match the configured token
    #[error("Invalid callback token")]
    InvalidToken,

    /// The client has no active merchant capable of subscription charges
    #[error("No active subscription merchant for client {0}")]
    NoActiveMerchant(Uuid),

    /// A webhook referenced a transaction we never recorded
    #[error("Payment record not found for transaction {0}")]
    PaymentRecordNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(Uuid),

    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Client not found: {0}")]
    ClientNotFound(Uuid),

    /// Outbound charge creation exceeded the configured timeout
    #[error("Gateway request timed out after {0:?}")]
    GatewayTimeout(Duration),

    /// The gateway answered the charge request with a non-success status
    #[error("Gateway rejected charge ({status}): {body}")]
    GatewayRejected { status: u16, body: String },

    #[error("Unsupported gateway type: {0}")]
    UnsupportedGateway(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Whether a retry of the failed operation could plausibly succeed.
    ///
    /// Merchant misconfiguration and rejected charges are permanent for a
    /// given sweep; timeouts, transport errors and gateway 5xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::GatewayTimeout(_) | BillingError::Http(_) => true,
            BillingError::GatewayRejected { status, .. } => *status >= 500,
            BillingError::Database(_) => true,
            _ => false,
        }
    }
}

/// Result type for billing operations
pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BillingError::GatewayTimeout(Duration::from_secs(30)).is_transient());
        assert!(BillingError::GatewayRejected {
            status: 503,
            body: "unavailable".to_string()
        }
        .is_transient());

        assert!(!BillingError::GatewayRejected {
            status: 402,
            body: "declined".to_string()
        }
        .is_transient());
        assert!(!BillingError::NoActiveMerchant(Uuid::nil()).is_transient());
        assert!(!BillingError::InvalidSignature.is_transient());
    }
}
