//! Billing email notifications
//!
//! Sends payment lifecycle emails through the Resend HTTP API. All sends
//! are fire-and-forget from the reconciliation engine's point of view:
//! failures are logged by the caller and never affect subscription or
//! license state.

use std::time::Duration;

use serde_json::json;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Email notification sender for billing events
#[derive(Clone)]
pub struct BillingEmailService {
    client: reqwest::Client,
    api_key: String,
    from_address: String,
    api_url: String,
}

impl BillingEmailService {
    /// Create from environment. Missing RESEND_API_KEY disables sending;
    /// the service stays constructible so callers need no special case.
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY").unwrap_or_default();
        let from_address = std::env::var("BILLING_EMAIL_FROM")
            .unwrap_or_else(|_| "billing@tokopos.id".to_string());

        Self::new(api_key, from_address)
    }

    pub fn new(api_key: String, from_address: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from_address,
            api_url: RESEND_API_URL.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> BillingResult<()> {
        if !self.is_enabled() {
            tracing::debug!(to = %to, subject = %subject, "Email disabled, skipping send");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.api_url)
            .timeout(SEND_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from_address,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Notification(format!(
                "Email provider returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }

    /// Payment received; subscription renewed through `next_billing_date`.
    pub async fn send_payment_success(
        &self,
        to: &str,
        client_name: &str,
        amount: i64,
        currency: &str,
        next_billing_date: OffsetDateTime,
    ) -> BillingResult<()> {
        let subject = "Payment received - subscription renewed";
        let html = format!(
            "<p>Hi {},</p>\
             <p>We received your payment of {} {}. Your subscription is active \
             and will next be billed on {}.</p>",
            client_name,
            currency,
            amount,
            next_billing_date.date()
        );
        self.send(to, subject, &html).await
    }

    /// A billing attempt failed; content escalates with the failure count.
    pub async fn send_payment_failed(
        &self,
        to: &str,
        client_name: &str,
        amount: i64,
        currency: &str,
        failure_count: i32,
        reason: &str,
    ) -> BillingResult<()> {
        let subject = if failure_count >= 3 {
            "Urgent: subscription payment failed again"
        } else {
            "Subscription payment failed"
        };
        let html = format!(
            "<p>Hi {},</p>\
             <p>We could not collect your subscription payment of {} {} \
             ({}). Please update your payment method to keep your stores \
             active.</p>",
            client_name, currency, amount, reason
        );
        self.send(to, subject, &html).await
    }

    /// Subscription suspended after repeated failures; store licenses are
    /// suspended with it.
    pub async fn send_subscription_suspended(
        &self,
        to: &str,
        client_name: &str,
    ) -> BillingResult<()> {
        let subject = "Subscription suspended";
        let html = format!(
            "<p>Hi {},</p>\
             <p>Your subscription has been suspended after repeated failed \
             payment attempts, and your store licenses are on hold. Settle \
             the outstanding payment to restore access.</p>",
            client_name
        );
        self.send(to, subject, &html).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn disabled_service_skips_send() {
        let service = BillingEmailService::new(String::new(), "billing@test".to_string());
        assert!(!service.is_enabled());

        // No server behind it; would error if it actually sent.
        service
            .send_payment_success(
                "owner@example.com",
                "Warung Maju",
                150_000,
                "IDR",
                datetime!(2024-02-01 00:00 UTC),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_surfaces_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(422)
            .with_body("invalid from address")
            .create_async()
            .await;

        let service = BillingEmailService::new("re_test_key".to_string(), "bad".to_string())
            .with_api_url(server.url());

        let err = service
            .send_subscription_suspended("owner@example.com", "Warung Maju")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("422"));
        mock.assert_async().await;
    }
}
