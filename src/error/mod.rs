//! Error types returned to gateway clients
//!
//! Every failure is rendered as `{"error": "<message>"}` with a status code.
//! Internal details never reach the client; they are logged where the error
//! is raised.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Failure while handling a gateway request
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Method other than GET or OPTIONS
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// `license` or `product` absent or blank
    #[error("Missing required parameters")]
    MissingParameters,

    /// License shorter than the configured minimum
    #[error("Invalid license format")]
    InvalidLicense,

    /// Upstream did not answer within the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Upstream answered with a non-2xx status
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: &'static str,
    },

    /// Anything unexpected (network failure, unreadable body, ...)
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::MissingParameters | GatewayError::InvalidLicense => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Timeout => StatusCode::REQUEST_TIMEOUT,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::MethodNotAllowed => "method_not_allowed",
            GatewayError::MissingParameters | GatewayError::InvalidLicense => "rejected",
            GatewayError::Timeout => "timed_out",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

/// JSON body of an error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
