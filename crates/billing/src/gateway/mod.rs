//! Payment gateway adapter layer
//!
//! Per-provider webhook verification and status normalization, plus the
//! outbound charge manager. Each adapter maps its provider's status
//! vocabulary into a [`WebhookOutcome`] through a closed enum, so a new
//! provider status surfaces at the type level instead of falling through
//! a string match.

pub mod generic;
pub mod manager;
pub mod midtrans;
pub mod xendit;

pub use generic::{GenericAdapter, GenericCallback};
pub use manager::{ChargeCreation, ChargeRequest, PaymentGatewayManager};
pub use midtrans::{MidtransAdapter, MidtransNotification};
pub use xendit::{XenditAdapter, XenditCallback};

use subtle::ConstantTimeEq;

/// Canonical outcome of a normalized webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The gateway confirmed payment
    Success { transaction_id: String },
    /// The gateway reported a terminal failure
    Failure {
        transaction_id: String,
        reason: String,
    },
    /// Nothing to apply yet; log and acknowledge
    Pending { transaction_id: String },
}

impl WebhookOutcome {
    pub fn transaction_id(&self) -> &str {
        match self {
            WebhookOutcome::Success { transaction_id }
            | WebhookOutcome::Failure { transaction_id, .. }
            | WebhookOutcome::Pending { transaction_id } => transaction_id,
        }
    }
}

/// Constant-time string equality for signatures and callback tokens.
pub(crate) fn secrets_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_match_is_exact() {
        assert!(secrets_match("abc123", "abc123"));
        assert!(!secrets_match("abc123", "ABC123"));
        assert!(!secrets_match("abc123", "abc1234"));
        assert!(!secrets_match("", "abc"));
    }

    #[test]
    fn outcome_exposes_transaction_id() {
        let outcome = WebhookOutcome::Failure {
            transaction_id: "trx-1".to_string(),
            reason: "Payment deny".to_string(),
        };
        assert_eq!(outcome.transaction_id(), "trx-1");
    }
}
