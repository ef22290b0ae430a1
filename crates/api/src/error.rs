//! API error handling
//!
//! Maps billing errors onto the webhook response contract: authenticity
//! failures answer 403 with a short message, everything unexpected answers
//! 500. Handled outcomes (including no-ops) never reach this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use tokopos_billing::BillingError;

/// Errors surfaced by webhook handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Internal server error")]
    Internal(#[source] BillingError),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidSignature => ApiError::InvalidSignature,
            BillingError::InvalidToken => ApiError::InvalidToken,
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidSignature => (StatusCode::FORBIDDEN, "Invalid signature"),
            ApiError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
            ApiError::Internal(source) => {
                tracing::error!(error = %source, "Webhook processing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_map_to_403() {
        let response = ApiError::from(BillingError::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = ApiError::from(BillingError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn other_billing_errors_map_to_500() {
        let response =
            ApiError::from(BillingError::Internal("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
