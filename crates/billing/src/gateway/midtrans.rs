//! Midtrans webhook adapter
//!
//! Verifies the sha512 notification signature and normalizes the
//! `transaction_status`/`fraud_status` pair into a canonical outcome.

use serde::Deserialize;
use sha2::{Digest, Sha512};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{secrets_match, WebhookOutcome};

/// Midtrans HTTP notification body (the fields this core consumes)
#[derive(Debug, Clone, Deserialize)]
pub struct MidtransNotification {
    /// Internal transaction id; Midtrans echoes back what we charged with
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    /// sha512(order_id + status_code + gross_amount + server_key), hex
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
}

/// Midtrans transaction status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionStatus {
    Capture,
    Settlement,
    Pending,
    Deny,
    Expire,
    Cancel,
    Unrecognized,
}

impl TransactionStatus {
    fn from_str(s: &str) -> Self {
        match s {
            "capture" => TransactionStatus::Capture,
            "settlement" => TransactionStatus::Settlement,
            "pending" => TransactionStatus::Pending,
            "deny" => TransactionStatus::Deny,
            "expire" => TransactionStatus::Expire,
            "cancel" => TransactionStatus::Cancel,
            _ => TransactionStatus::Unrecognized,
        }
    }
}

/// Fraud assessment attached to card captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FraudStatus {
    Accept,
    Challenge,
    Other,
}

impl FraudStatus {
    fn from_str(s: Option<&str>) -> Self {
        match s {
            Some("accept") => FraudStatus::Accept,
            Some("challenge") => FraudStatus::Challenge,
            _ => FraudStatus::Other,
        }
    }
}

/// Verifier + normalizer for Midtrans notifications
pub struct MidtransAdapter {
    server_key: String,
}

impl MidtransAdapter {
    pub fn new(server_key: &str) -> Self {
        Self {
            server_key: server_key.to_string(),
        }
    }

    /// Verify the notification signature.
    ///
    /// The signature is the hex sha512 of the concatenation
    /// `order_id + status_code + gross_amount + server_key` and must match
    /// `signature_key` exactly (case-sensitive hex). A mismatch rejects the
    /// delivery before any lookup or state change.
    pub fn verify(&self, notification: &MidtransNotification) -> BillingResult<()> {
        let expected = Self::signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        );

        if !secrets_match(&expected, &notification.signature_key) {
            tracing::warn!(
                order_id = %notification.order_id,
                "Midtrans notification signature mismatch"
            );
            return Err(BillingError::InvalidSignature);
        }

        Ok(())
    }

    pub(crate) fn signature(
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        server_key: &str,
    ) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Map the status pair to a canonical outcome.
    ///
    /// `capture` is only a success once fraud screening accepts it; a
    /// `challenge` stays pending until Midtrans re-notifies. Terminal
    /// failures carry the raw status in the reason.
    pub fn normalize(&self, notification: &MidtransNotification) -> WebhookOutcome {
        let transaction_id = notification.order_id.clone();
        let status = TransactionStatus::from_str(&notification.transaction_status);
        let fraud = FraudStatus::from_str(notification.fraud_status.as_deref());

        match (status, fraud) {
            (TransactionStatus::Capture, FraudStatus::Accept) => {
                WebhookOutcome::Success { transaction_id }
            }
            (TransactionStatus::Capture, FraudStatus::Challenge) => {
                WebhookOutcome::Pending { transaction_id }
            }
            (TransactionStatus::Capture, FraudStatus::Other) => {
                tracing::warn!(
                    order_id = %notification.order_id,
                    fraud_status = ?notification.fraud_status,
                    "Capture with unrecognized fraud status, treating as pending"
                );
                WebhookOutcome::Pending { transaction_id }
            }
            (TransactionStatus::Settlement, _) => WebhookOutcome::Success { transaction_id },
            (TransactionStatus::Pending, _) => WebhookOutcome::Pending { transaction_id },
            (
                TransactionStatus::Deny | TransactionStatus::Expire | TransactionStatus::Cancel,
                _,
            ) => WebhookOutcome::Failure {
                transaction_id,
                reason: format!("Payment {}", notification.transaction_status),
            },
            (TransactionStatus::Unrecognized, _) => {
                tracing::warn!(
                    order_id = %notification.order_id,
                    transaction_status = %notification.transaction_status,
                    "Unrecognized Midtrans transaction status, treating as pending"
                );
                WebhookOutcome::Pending { transaction_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &str = "SB-Mid-server-testkey";

    fn notification(status: &str, fraud: Option<&str>) -> MidtransNotification {
        let order_id = "sub-0c43a9".to_string();
        let status_code = "200".to_string();
        let gross_amount = "150000.00".to_string();
        let signature_key =
            MidtransAdapter::signature(&order_id, &status_code, &gross_amount, SERVER_KEY);

        MidtransNotification {
            order_id,
            status_code,
            gross_amount,
            signature_key,
            transaction_status: status.to_string(),
            fraud_status: fraud.map(|s| s.to_string()),
        }
    }

    #[test]
    fn valid_signature_accepted() {
        let adapter = MidtransAdapter::new(SERVER_KEY);
        assert!(adapter.verify(&notification("settlement", None)).is_ok());
    }

    #[test]
    fn tampered_amount_rejected() {
        let adapter = MidtransAdapter::new(SERVER_KEY);
        let mut n = notification("settlement", None);
        n.gross_amount = "1.00".to_string();

        assert!(matches!(
            adapter.verify(&n),
            Err(BillingError::InvalidSignature)
        ));
    }

    #[test]
    fn signature_comparison_is_case_sensitive() {
        let adapter = MidtransAdapter::new(SERVER_KEY);
        let mut n = notification("settlement", None);
        n.signature_key = n.signature_key.to_uppercase();

        assert!(matches!(
            adapter.verify(&n),
            Err(BillingError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_server_key_rejected() {
        let adapter = MidtransAdapter::new("some-other-key");
        assert!(adapter.verify(&notification("settlement", None)).is_err());
    }

    #[test]
    fn status_mapping_table() {
        let adapter = MidtransAdapter::new(SERVER_KEY);

        let cases: &[(&str, Option<&str>, WebhookOutcome)] = &[
            (
                "capture",
                Some("accept"),
                WebhookOutcome::Success {
                    transaction_id: "sub-0c43a9".to_string(),
                },
            ),
            (
                "capture",
                Some("challenge"),
                WebhookOutcome::Pending {
                    transaction_id: "sub-0c43a9".to_string(),
                },
            ),
            (
                "settlement",
                None,
                WebhookOutcome::Success {
                    transaction_id: "sub-0c43a9".to_string(),
                },
            ),
            (
                "pending",
                None,
                WebhookOutcome::Pending {
                    transaction_id: "sub-0c43a9".to_string(),
                },
            ),
            (
                "deny",
                None,
                WebhookOutcome::Failure {
                    transaction_id: "sub-0c43a9".to_string(),
                    reason: "Payment deny".to_string(),
                },
            ),
            (
                "expire",
                None,
                WebhookOutcome::Failure {
                    transaction_id: "sub-0c43a9".to_string(),
                    reason: "Payment expire".to_string(),
                },
            ),
            (
                "cancel",
                None,
                WebhookOutcome::Failure {
                    transaction_id: "sub-0c43a9".to_string(),
                    reason: "Payment cancel".to_string(),
                },
            ),
        ];

        for (status, fraud, expected) in cases {
            let outcome = adapter.normalize(&notification(status, *fraud));
            assert_eq!(&outcome, expected, "status={} fraud={:?}", status, fraud);
        }
    }

    #[test]
    fn unrecognized_status_is_pending() {
        let adapter = MidtransAdapter::new(SERVER_KEY);
        let outcome = adapter.normalize(&notification("refund", None));
        assert!(matches!(outcome, WebhookOutcome::Pending { .. }));
    }
}
