//! Webhook ingress handlers
//!
//! Thin entry points per payment gateway: verify authenticity, normalize
//! the provider status, and hand the outcome to the reconciliation engine.
//!
//! Every handled outcome answers `200 {"message":"OK"}` - including
//! pending no-ops and unknown transaction ids, so a permanently
//! unresolvable mismatch does not turn into a gateway retry storm.
//! Authenticity failures answer 403 before any lookup or state change.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use tokopos_billing::gateway::xendit::CALLBACK_TOKEN_HEADER;
use tokopos_billing::{
    BillingError, GenericAdapter, GenericCallback, MidtransAdapter, MidtransNotification,
    WebhookOutcome, XenditAdapter, XenditCallback,
};

use crate::error::ApiResult;
use crate::state::AppState;

/// Body returned for every handled webhook
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    message: &'static str,
}

impl WebhookAck {
    fn ok() -> Self {
        Self { message: "OK" }
    }
}

/// `POST /webhooks/subscription/midtrans`
pub async fn midtrans_notification(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<WebhookAck>> {
    let notification: MidtransNotification =
        serde_json::from_value(payload.clone()).map_err(BillingError::from)?;

    let adapter = MidtransAdapter::new(&state.billing.config.midtrans_server_key);
    adapter.verify(&notification)?;

    let outcome = adapter.normalize(&notification);
    dispatch(&state, outcome, payload).await?;

    Ok(Json(WebhookAck::ok()))
}

/// `POST /webhooks/subscription/xendit`
pub async fn xendit_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<WebhookAck>> {
    let adapter = XenditAdapter::new(&state.billing.config.xendit_callback_token);
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    adapter.verify(token)?;

    let callback: XenditCallback =
        serde_json::from_value(payload.clone()).map_err(BillingError::from)?;

    let outcome = adapter.normalize(&callback);
    dispatch(&state, outcome, payload).await?;

    Ok(Json(WebhookAck::ok()))
}

/// `POST /webhooks/subscription/generic`
///
/// Test/integration path with no authenticity check; not routed in
/// production deployments.
pub async fn generic_callback(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<WebhookAck>> {
    let callback: GenericCallback =
        serde_json::from_value(payload.clone()).map_err(BillingError::from)?;

    let outcome = GenericAdapter.normalize(&callback);
    dispatch(&state, outcome, payload).await?;

    Ok(Json(WebhookAck::ok()))
}

/// Apply a normalized outcome through the reconciliation engine.
///
/// `apply_*` returning `false` (unknown transaction, duplicate delivery)
/// is already logged by the engine; the gateway still gets its 200.
async fn dispatch(
    state: &AppState,
    outcome: WebhookOutcome,
    raw_payload: serde_json::Value,
) -> ApiResult<()> {
    match outcome {
        WebhookOutcome::Success { transaction_id } => {
            state
                .billing
                .payments
                .apply_success(&transaction_id, &raw_payload)
                .await?;
        }
        WebhookOutcome::Failure {
            transaction_id,
            reason,
        } => {
            state
                .billing
                .payments
                .apply_failure(&transaction_id, &reason)
                .await?;
        }
        WebhookOutcome::Pending { transaction_id } => {
            tracing::info!(
                transaction_id = %transaction_id,
                "Pending gateway status acknowledged, nothing to apply"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_body_matches_contract() {
        let body = serde_json::to_value(WebhookAck::ok()).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "OK" }));
    }

    #[test]
    fn midtrans_payload_parses_from_raw_json() {
        let payload = serde_json::json!({
            "order_id": "sub-1",
            "status_code": "200",
            "gross_amount": "150000.00",
            "signature_key": "abc",
            "transaction_status": "settlement",
            // Extra provider fields must not break parsing
            "payment_type": "bank_transfer",
            "transaction_time": "2024-01-01 00:00:00",
        });

        let parsed: MidtransNotification = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.order_id, "sub-1");
        assert!(parsed.fraud_status.is_none());
    }

    #[test]
    fn malformed_midtrans_payload_is_an_error() {
        let payload = serde_json::json!({ "order_id": "sub-1" });
        assert!(serde_json::from_value::<MidtransNotification>(payload).is_err());
    }
}
