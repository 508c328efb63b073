//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core_handshake::HandshakeError;

/// Generic body used when failure reasons are not exposed
pub const GENERIC_FAILURE: &str = "handshake failed";

/// Error returned by every handshake endpoint
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: String,
}

impl ApiError {
    /// Map a handshake failure to a 500 with either the short reason or the generic body
    pub fn handshake(error: &HandshakeError, expose: bool) -> Self {
        let body = if expose {
            error.public_reason().to_string()
        } else {
            GENERIC_FAILURE.to_string()
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
