//! Mapping of ledger errors onto HTTP responses.
//!
//! Every failure body has the shape `{"error": {"code": "...", "message": "..."}}`
//! where `code` is stable and safe to branch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use creditbook_common::error::{Error, ErrorKind};

use super::signature::SignatureError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::InvalidAmount(_) | Error::Uuid(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Unauthorized(_) => StatusCode::FORBIDDEN,
            Error::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::CodeNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::CodeExpired(_) => StatusCode::GONE,
            Error::InsufficientBalance(_)
            | Error::CodeExhausted(_)
            | Error::AlreadyRedeemed(_)
            | Error::AlreadyOwned(_)
            | Error::DuplicateCode(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage details stay in the log.
        let message = match err.kind() {
            ErrorKind::Internal | ErrorKind::Corruption => {
                error!("request failed: {}", err);
                "internal error".to_string()
            }
            _ => err.to_string(),
        };

        Self {
            status,
            code: err.code(),
            message,
        }
    }
}

impl From<SignatureError> for ApiError {
    fn from(err: SignatureError) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "InvalidSignature",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}
