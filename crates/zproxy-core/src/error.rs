use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;

use crate::normalize::ValidationError;
use crate::relay::RelayError;
use crate::upstream_client::GatewayError;

pub const CANCELED_MESSAGE: &str = "request canceled";
pub const BAD_GATEWAY_MESSAGE: &str = "Failed to connect to upstream server";

/// Status used when the caller goes away before a response is produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Stable external vocabulary for request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedJson,
    MissingField,
    InvalidMessage,
    InvalidRole,
    UnknownModel,
    Canceled,
    BadGateway,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::MalformedJson
            | ErrorKind::MissingField
            | ErrorKind::InvalidMessage
            | ErrorKind::InvalidRole => StatusCode::BAD_REQUEST,
            ErrorKind::UnknownModel => StatusCode::NOT_FOUND,
            ErrorKind::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::BAD_REQUEST),
            ErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedJson => "malformed_json",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::InvalidMessage => "invalid_message",
            ErrorKind::InvalidRole => "invalid_role",
            ErrorKind::UnknownModel => "unknown_model",
            ErrorKind::Canceled => "canceled",
            ErrorKind::BadGateway => "bad_gateway",
            ErrorKind::Internal => "internal",
        }
    }
}

/// The only value that turns into a caller-visible failure response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub message: String,
}

impl ProxyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status(),
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, CANCELED_MESSAGE)
    }

    pub fn bad_gateway() -> Self {
        Self::new(ErrorKind::BadGateway, BAD_GATEWAY_MESSAGE)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<ValidationError> for ProxyError {
    fn from(err: ValidationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<GatewayError> for ProxyError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Canceled => Self::canceled(),
            GatewayError::BadGateway { .. } => Self::bad_gateway(),
        }
    }
}

impl From<RelayError> for ProxyError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Canceled | RelayError::WriteFailed => Self::canceled(),
            RelayError::Upstream(_) => Self::bad_gateway(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
