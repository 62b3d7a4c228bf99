//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{Classify, ErrorKind};
use payments::PaymentError;
use serde::Serialize;

/// API-level error. Every service error arrives here already classified.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request the services never saw (headers, path, body).
    BadRequest { code: &'static str, message: String },

    /// An error raised by a service.
    Service {
        kind: ErrorKind,
        code: &'static str,
        message: String,
    },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Service {
            kind: ErrorKind::Forbidden,
            code,
            message: message.into(),
        }
    }

    fn classified<E: Classify + std::fmt::Display>(err: E) -> Self {
        ApiError::Service {
            kind: err.kind(),
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Service { kind, .. } => status_for(*kind),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } | ApiError::Service { code, .. } => code,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict | ErrorKind::InsufficientResource => StatusCode::CONFLICT,
        ErrorKind::Unavailable => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            ApiError::Service {
                kind: ErrorKind::Internal,
                code,
                message,
            } => {
                // Detail stays in the logs
                tracing::error!(%code, error = %message, "internal server error");
                (*code, "Internal server error")
            }
            ApiError::BadRequest { code, message } | ApiError::Service { code, message, .. } => {
                (*code, message.as_str())
            }
        };

        let body = ErrorBody {
            success: false,
            error: ErrorDetail { code, message },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::classified(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::classified(err)
    }
}
