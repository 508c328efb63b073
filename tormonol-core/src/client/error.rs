use thiserror::Error;

use crate::core_handshake::HandshakeError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{step} rejected with status {status}: {body}")]
    Rejected {
        step: &'static str,
        status: u16,
        body: String,
    },

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Session closed")]
    SessionClosed,
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidUrl(e.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
