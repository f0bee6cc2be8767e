//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::providers::ProviderError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials, or a webhook whose
    /// signature did not verify.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The user already owns this app.
    #[error("app already owned")]
    AlreadyOwned,

    /// Neither provider settles the requested currency.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// A payment provider call failed.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::AlreadyOwned => (StatusCode::BAD_REQUEST, "already_owned", self.to_string()),
            Self::UnsupportedCurrency(_) => (
                StatusCode::BAD_REQUEST,
                "unsupported_currency",
                self.to_string(),
            ),
            Self::PaymentProvider(msg) => {
                tracing::error!(error = %msg, "Payment provider failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment_provider_error",
                    "Payment provider request failed".to_string(),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<portal_market_store::StoreError> for ApiError {
    fn from(err: portal_market_store::StoreError) -> Self {
        match err {
            portal_market_store::StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            portal_market_store::StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}

impl From<portal_market_core::MarketError> for ApiError {
    fn from(err: portal_market_core::MarketError) -> Self {
        match err {
            portal_market_core::MarketError::UnsupportedCurrency(code) => {
                Self::UnsupportedCurrency(code)
            }
            portal_market_core::MarketError::InvalidPrice(price) => {
                Self::Internal(format!("invalid price: {price}"))
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidSignature => Self::Unauthorized,
            ProviderError::InvalidPayload(msg) => Self::BadRequest(msg),
            other => Self::PaymentProvider(other.to_string()),
        }
    }
}
