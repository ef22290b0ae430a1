//! Xendit webhook adapter
//!
//! Callbacks authenticate with a shared token in the `X-CALLBACK-TOKEN`
//! header; invoice statuses normalize to the canonical outcome.

use serde::Deserialize;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{secrets_match, WebhookOutcome};

/// Header carrying the shared callback token
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

/// Xendit invoice callback body (the fields this core consumes)
#[derive(Debug, Clone, Deserialize)]
pub struct XenditCallback {
    /// Internal transaction id; we set it as the invoice external_id
    pub external_id: String,
    pub status: String,
}

/// Xendit invoice status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvoiceStatus {
    Paid,
    Expired,
    Failed,
    Unrecognized,
}

impl InvoiceStatus {
    fn from_str(s: &str) -> Self {
        match s {
            "PAID" => InvoiceStatus::Paid,
            "EXPIRED" => InvoiceStatus::Expired,
            "FAILED" => InvoiceStatus::Failed,
            _ => InvoiceStatus::Unrecognized,
        }
    }
}

/// Verifier + normalizer for Xendit callbacks
pub struct XenditAdapter {
    callback_token: String,
}

impl XenditAdapter {
    pub fn new(callback_token: &str) -> Self {
        Self {
            callback_token: callback_token.to_string(),
        }
    }

    /// Verify the callback token header. Absent or mismatched tokens reject
    /// the delivery before any lookup or state change. An empty configured
    /// token rejects everything rather than accepting everything.
    pub fn verify(&self, header_token: Option<&str>) -> BillingResult<()> {
        let provided = header_token.unwrap_or_default();

        if self.callback_token.is_empty() || !secrets_match(&self.callback_token, provided) {
            tracing::warn!("Xendit callback token mismatch");
            return Err(BillingError::InvalidToken);
        }

        Ok(())
    }

    /// Map the invoice status to a canonical outcome. Statuses outside the
    /// paid/expired/failed set (e.g. PENDING, SETTLING) are acknowledged
    /// without applying anything.
    pub fn normalize(&self, callback: &XenditCallback) -> WebhookOutcome {
        let transaction_id = callback.external_id.clone();

        match InvoiceStatus::from_str(&callback.status) {
            InvoiceStatus::Paid => WebhookOutcome::Success { transaction_id },
            InvoiceStatus::Expired | InvoiceStatus::Failed => WebhookOutcome::Failure {
                transaction_id,
                reason: format!("Payment {}", callback.status),
            },
            InvoiceStatus::Unrecognized => {
                tracing::info!(
                    external_id = %callback.external_id,
                    status = %callback.status,
                    "Unhandled Xendit invoice status, acknowledging without action"
                );
                WebhookOutcome::Pending { transaction_id }
            }
        }
    }
}
