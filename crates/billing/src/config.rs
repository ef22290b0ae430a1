//! Billing configuration
//!
//! Explicit config struct passed into each service at construction. There is
//! no process-global settings lookup; everything the gateways need travels
//! through this struct.

use std::time::Duration;

use crate::error::{BillingError, BillingResult};

const DEFAULT_MIDTRANS_BASE_URL: &str = "https://app.midtrans.com";
const DEFAULT_XENDIT_BASE_URL: &str = "https://api.xendit.co";

/// Default timeout for outbound gateway calls (charge creation).
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default age after which an unresolved pending payment record is expired
/// by the reconciliation sweep.
pub const DEFAULT_PENDING_PAYMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the payment gateways and reconciliation engine
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Platform-level Midtrans server key, used to verify notification
    /// signatures. Per-merchant keys are used for outbound charges.
    pub midtrans_server_key: String,
    pub midtrans_base_url: String,

    /// Xendit secret key for outbound invoice creation
    pub xendit_secret_key: String,
    /// Expected value of the `X-CALLBACK-TOKEN` header on Xendit callbacks
    pub xendit_callback_token: String,
    pub xendit_base_url: String,

    /// Bounded timeout for outbound gateway HTTP calls
    pub gateway_timeout: Duration,

    /// Age after which unresolved pending payment records are expired
    pub pending_payment_ttl: Duration,
}

impl BillingConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails if neither gateway is configured; a deployment with only one
    /// gateway is fine.
    pub fn from_env() -> BillingResult<Self> {
        let midtrans_server_key = std::env::var("MIDTRANS_SERVER_KEY").unwrap_or_default();
        let xendit_secret_key = std::env::var("XENDIT_SECRET_KEY").unwrap_or_default();
        let xendit_callback_token = std::env::var("XENDIT_CALLBACK_TOKEN").unwrap_or_default();

        if midtrans_server_key.is_empty() && xendit_secret_key.is_empty() {
            return Err(BillingError::Internal(
                "No payment gateway configured (set MIDTRANS_SERVER_KEY or XENDIT_SECRET_KEY)"
                    .to_string(),
            ));
        }

        if !xendit_secret_key.is_empty() && xendit_callback_token.is_empty() {
            tracing::warn!(
                "XENDIT_SECRET_KEY is set but XENDIT_CALLBACK_TOKEN is missing - \
                 Xendit callbacks will be rejected"
            );
        }

        let gateway_timeout = std::env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);

        let pending_payment_ttl = std::env::var("PENDING_PAYMENT_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|h| Duration::from_secs(h * 3600))
            .unwrap_or(DEFAULT_PENDING_PAYMENT_TTL);

        Ok(Self {
            midtrans_server_key,
            midtrans_base_url: std::env::var("MIDTRANS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MIDTRANS_BASE_URL.to_string()),
            xendit_secret_key,
            xendit_callback_token,
            xendit_base_url: std::env::var("XENDIT_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_XENDIT_BASE_URL.to_string()),
            gateway_timeout,
            pending_payment_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(DEFAULT_GATEWAY_TIMEOUT, Duration::from_secs(30));
        assert_eq!(DEFAULT_PENDING_PAYMENT_TTL, Duration::from_secs(86_400));
    }
}
