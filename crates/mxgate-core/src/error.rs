//! Unified error handling for mxgate
//!
//! One error type for the whole gateway with automatic HTTP response
//! mapping. PBX transport failures keep their own kinds so the session
//! supervisor can classify them without string matching.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::REALM;

/// Main gateway error type
///
/// All errors surfaced at the HTTP boundary are converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum GatewayError {
    // ==================== Client Errors ====================
    #[error("{0}")]
    BadRequest(String),

    #[error("authorization required")]
    Unauthorized,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("phone number is not monitored")]
    NotMonitored,

    #[error("{0}")]
    NotAcceptable(String),

    #[error("not found: {0}")]
    NotFound(String),

    // ==================== PBX Errors ====================
    /// The PBX refused the supplied credentials. Terminal for the
    /// reconnect loop; 403 at the HTTP boundary.
    #[error("pbx login rejected: {0}")]
    LoginRejected(String),

    #[error("pbx read timeout: {0}")]
    PbxTimeout(String),

    #[error("pbx unavailable: {0}")]
    PbxUnavailable(String),

    // ==================== Internal Errors ====================
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,

            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,

            GatewayError::InvalidToken(_)
            | GatewayError::NotMonitored
            | GatewayError::LoginRejected(_) => StatusCode::FORBIDDEN,

            GatewayError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,

            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,

            GatewayError::PbxTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

            GatewayError::PbxUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            GatewayError::Config(_)
            | GatewayError::Serialization(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::InvalidToken(_) => "invalid_token",
            GatewayError::NotMonitored => "not_monitored",
            GatewayError::NotAcceptable(_) => "not_acceptable",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::LoginRejected(_) => "login_rejected",
            GatewayError::PbxTimeout(_) => "pbx_timeout",
            GatewayError::PbxUnavailable(_) => "pbx_unavailable",
            GatewayError::Config(_) => "config_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        GatewayError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        let mut builder = HttpResponse::build(status);
        if matches!(self, GatewayError::Unauthorized) {
            builder.insert_header((
                "WWW-Authenticate",
                format!("Bearer realm={:?}", REALM),
            ));
        }
        builder.json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<quick_xml::DeError> for GatewayError {
    fn from(err: quick_xml::DeError) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}
