//! Generic webhook adapter
//!
//! Test/integration path with no authenticity check. Not routed in
//! production deployments.

use serde::Deserialize;

use crate::gateway::WebhookOutcome;

const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// Generic callback body
#[derive(Debug, Clone, Deserialize)]
pub struct GenericCallback {
    pub transaction_id: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Normalizer for the generic test gateway
pub struct GenericAdapter;

impl GenericAdapter {
    /// `status == "success"` confirms payment; anything else is a failure
    /// with the caller-supplied reason.
    pub fn normalize(&self, callback: &GenericCallback) -> WebhookOutcome {
        let transaction_id = callback.transaction_id.clone();

        if callback.status == "success" {
            WebhookOutcome::Success { transaction_id }
        } else {
            WebhookOutcome::Failure {
                transaction_id,
                reason: callback
                    .reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_status_maps_to_success() {
        let outcome = GenericAdapter.normalize(&GenericCallback {
            transaction_id: "gen-1".to_string(),
            status: "success".to_string(),
            reason: None,
        });
        assert_eq!(
            outcome,
            WebhookOutcome::Success {
                transaction_id: "gen-1".to_string()
            }
        );
    }

    #[test]
    fn anything_else_fails_with_reason() {
        let outcome = GenericAdapter.normalize(&GenericCallback {
            transaction_id: "gen-2".to_string(),
            status: "declined".to_string(),
            reason: Some("Card declined".to_string()),
        });
        assert_eq!(
            outcome,
            WebhookOutcome::Failure {
                transaction_id: "gen-2".to_string(),
                reason: "Card declined".to_string(),
            }
        );
    }

    #[test]
    fn missing_reason_uses_default() {
        let outcome = GenericAdapter.normalize(&GenericCallback {
            transaction_id: "gen-3".to_string(),
            status: "error".to_string(),
            reason: None,
        });
        assert_eq!(
            outcome,
            WebhookOutcome::Failure {
                transaction_id: "gen-3".to_string(),
                reason: "Payment failed".to_string(),
            }
        );
    }
}
