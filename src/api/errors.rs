//! API error handling.
//!
//! Structured error responses with HTTP status codes and request tracking.
//! Engine errors map onto the taxonomy here so the client can tell "you
//! can't afford this bet" apart from "something went wrong, your bet is
//! safe".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::EngineError;

/// Top-level API error response with request tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (INSUFFICIENT_FUNDS, ROUND_SETTLED, ...).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    BadRequest(String),
    PaymentRequired(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn forbidden(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Forbidden(message),
            request_id,
        }
    }

    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Translate an engine failure into the API taxonomy.
    pub fn from_engine(request_id: String, err: EngineError) -> Self {
        let kind = match &err {
            EngineError::InsufficientFunds { .. } => {
                ApiErrorKind::PaymentRequired(format!("You can't afford this bet: {}", err))
            }
            EngineError::InvalidParameter(_) => ApiErrorKind::BadRequest(err.to_string()),
            EngineError::AccountNotFound(_) | EngineError::RoundNotFound(_) => {
                ApiErrorKind::NotFound(err.to_string())
            }
            EngineError::RoundAlreadySettled(_) | EngineError::RoundNotActive(_) => {
                ApiErrorKind::Conflict(err.to_string())
            }
            EngineError::WrongUser { .. } => ApiErrorKind::Forbidden(err.to_string()),
            EngineError::Vrf(_) => ApiErrorKind::InternalError(err.to_string()),
            EngineError::LedgerIo(_) => ApiErrorKind::ServiceUnavailable(
                "Something went wrong, your bet is safe — try again.".to_string(),
            ),
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (label, msg) = self.kind.parts();
        write!(f, "[{}] {}: {}", self.request_id, label, msg)
    }
}

impl std::error::Error for ApiError {}

impl ApiErrorKind {
    fn parts(&self) -> (&'static str, &str) {
        match self {
            ApiErrorKind::BadRequest(msg) => ("Bad Request", msg),
            ApiErrorKind::PaymentRequired(msg) => ("Payment Required", msg),
            ApiErrorKind::Forbidden(msg) => ("Forbidden", msg),
            ApiErrorKind::NotFound(msg) => ("Not Found", msg),
            ApiErrorKind::Conflict(msg) => ("Conflict", msg),
            ApiErrorKind::InternalError(msg) => ("Internal Error", msg),
            ApiErrorKind::ServiceUnavailable(msg) => ("Service Unavailable", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiErrorKind::PaymentRequired(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS", msg.clone())
            }
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "ROUND_SETTLED", msg.clone()),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            ApiErrorKind::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
