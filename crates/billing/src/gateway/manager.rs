//! Payment gateway manager
//!
//! Resolves the outbound client for a merchant's gateway type and issues
//! charge-creation calls. The manager only originates payments; webhook
//! interpretation lives in the adapters.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::models::{GatewayType, Merchant};

/// Outbound charge request assembled by the payment service
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    /// Subscription/client/plan ids and the billing-period window
    pub metadata: serde_json::Value,
}

/// Result of a successful charge creation
#[derive(Debug, Clone)]
pub struct ChargeCreation {
    /// Internal transaction id the gateway will echo back in webhooks
    pub transaction_id: String,
    /// Hosted payment page, when the gateway provides one
    pub payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapTransactionResponse {
    #[allow(dead_code)]
    token: String,
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct XenditInvoiceResponse {
    #[allow(dead_code)]
    id: String,
    invoice_url: String,
}

/// Issues outbound charge-creation calls per merchant gateway type
#[derive(Clone)]
pub struct PaymentGatewayManager {
    config: BillingConfig,
    client: reqwest::Client,
}

impl PaymentGatewayManager {
    pub fn new(config: BillingConfig) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.gateway_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Create a charge with the merchant's gateway.
    ///
    /// Called before any local transaction is opened, so a slow gateway
    /// never holds a database connection.
    pub async fn create_charge(
        &self,
        merchant: &Merchant,
        request: &ChargeRequest,
    ) -> BillingResult<ChargeCreation> {
        let gateway = GatewayType::from_str(&merchant.gateway_type)
            .ok_or_else(|| BillingError::UnsupportedGateway(merchant.gateway_type.clone()))?;

        match gateway {
            GatewayType::Midtrans => self.create_midtrans_charge(merchant, request).await,
            GatewayType::Xendit => self.create_xendit_charge(merchant, request).await,
            GatewayType::Generic => Ok(ChargeCreation {
                transaction_id: format!("gen-{}", Uuid::new_v4()),
                payment_url: None,
            }),
        }
    }

    /// Midtrans Snap transaction. The generated order_id is our internal
    /// transaction id; Midtrans echoes it back in every notification.
    async fn create_midtrans_charge(
        &self,
        merchant: &Merchant,
        request: &ChargeRequest,
    ) -> BillingResult<ChargeCreation> {
        let order_id = format!("sub-{}", Uuid::new_v4());
        let url = format!("{}/snap/v1/transactions", self.config.midtrans_base_url);

        let body = json!({
            "transaction_details": {
                "order_id": order_id,
                "gross_amount": request.amount,
            },
            "customer_details": {
                "first_name": request.customer_name,
                "email": request.customer_email,
                "phone": request.customer_phone,
            },
            "item_details": [{
                "id": "subscription",
                "name": request.description,
                "price": request.amount,
                "quantity": 1,
            }],
            "metadata": request.metadata,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&merchant.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }

        let snap: SnapTransactionResponse = response.json().await?;

        Ok(ChargeCreation {
            transaction_id: order_id,
            payment_url: Some(snap.redirect_url),
        })
    }

    /// Xendit invoice. The external_id we set is our internal transaction
    /// id; Xendit callbacks carry it back as external_id.
    async fn create_xendit_charge(
        &self,
        merchant: &Merchant,
        request: &ChargeRequest,
    ) -> BillingResult<ChargeCreation> {
        let external_id = format!("sub-{}", Uuid::new_v4());
        let url = format!("{}/v2/invoices", self.config.xendit_base_url);

        let body = json!({
            "external_id": external_id,
            "amount": request.amount,
            "currency": request.currency,
            "description": request.description,
            "payer_email": request.customer_email,
            "metadata": request.metadata,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&merchant.server_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }

        let invoice: XenditInvoiceResponse = response.json().await?;

        Ok(ChargeCreation {
            transaction_id: external_id,
            payment_url: Some(invoice.invoice_url),
        })
    }

    fn map_transport_error(&self, error: reqwest::Error) -> BillingError {
        if error.is_timeout() {
            BillingError::GatewayTimeout(self.config.gateway_timeout)
        } else {
            BillingError::Http(error)
        }
    }

    async fn rejection(&self, response: reqwest::Response) -> BillingError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        BillingError::GatewayRejected { status, body }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::time::Duration;

    fn test_config(base_url: &str) -> BillingConfig {
        BillingConfig {
            midtrans_server_key: "SB-Mid-server-testkey".to_string(),
            midtrans_base_url: base_url.to_string(),
            xendit_secret_key: "xnd_test_key".to_string(),
            xendit_callback_token: "whx_token".to_string(),
            xendit_base_url: base_url.to_string(),
            gateway_timeout: Duration::from_secs(5),
            pending_payment_ttl: Duration::from_secs(86_400),
        }
    }

    fn merchant(gateway_type: &str) -> Merchant {
        Merchant {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            gateway_type: gateway_type.to_string(),
            server_key: "SB-Mid-server-testkey".to_string(),
            client_key: None,
            callback_token: None,
            is_active: true,
            supports_subscription: true,
        }
    }

    fn charge_request() -> ChargeRequest {
        ChargeRequest {
            amount: 150_000,
            currency: "IDR".to_string(),
            description: "Monthly subscription".to_string(),
            customer_name: "Warung Maju".to_string(),
            customer_email: "owner@example.com".to_string(),
            customer_phone: None,
            metadata: serde_json::json!({"subscription_id": "s1"}),
        }
    }

    #[tokio::test]
    async fn midtrans_charge_returns_order_id_and_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/snap/v1/transactions")
            .with_status(201)
            .with_body(r#"{"token":"snap-token","redirect_url":"https://pay.example/t"}"#)
            .create_async()
            .await;

        let manager = PaymentGatewayManager::new(test_config(&server.url())).unwrap();
        let charge = manager
            .create_charge(&merchant("midtrans"), &charge_request())
            .await
            .unwrap();

        assert!(charge.transaction_id.starts_with("sub-"));
        assert_eq!(
            charge.payment_url.as_deref(),
            Some("https://pay.example/t")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn xendit_charge_returns_external_id_and_invoice_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/invoices")
            .with_status(200)
            .with_body(r#"{"id":"inv-1","invoice_url":"https://invoice.example/i"}"#)
            .create_async()
            .await;

        let manager = PaymentGatewayManager::new(test_config(&server.url())).unwrap();
        let charge = manager
            .create_charge(&merchant("xendit"), &charge_request())
            .await
            .unwrap();

        assert!(charge.transaction_id.starts_with("sub-"));
        assert_eq!(
            charge.payment_url.as_deref(),
            Some("https://invoice.example/i")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn gateway_rejection_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/snap/v1/transactions")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let manager = PaymentGatewayManager::new(test_config(&server.url())).unwrap();
        let err = manager
            .create_charge(&merchant("midtrans"), &charge_request())
            .await
            .unwrap_err();

        match err {
            BillingError::GatewayRejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("expected GatewayRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_merchant_needs_no_network() {
        let manager =
            PaymentGatewayManager::new(test_config("http://127.0.0.1:1")).unwrap();
        let charge = manager
            .create_charge(&merchant("generic"), &charge_request())
            .await
            .unwrap();

        assert!(charge.transaction_id.starts_with("gen-"));
        assert!(charge.payment_url.is_none());
    }

    #[tokio::test]
    async fn unknown_gateway_type_is_rejected() {
        let manager =
            PaymentGatewayManager::new(test_config("http://127.0.0.1:1")).unwrap();
        let err = manager
            .create_charge(&merchant("paypal"), &charge_request())
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::UnsupportedGateway(_)));
    }
}
