use thiserror::Error;

use crate::core_crypto::CryptoError;

/// Failure class, used for metrics and to pick log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeErrorKind {
    /// Nonce unknown, already used or expired
    Replay,
    /// Signature did not verify against the trust anchor
    Authentication,
    /// Checkpoint or session keys missing for the given id
    ProtocolState,
    /// Body or key material could not be parsed
    Malformed,
    /// Local failure unrelated to the request
    Internal,
}

impl HandshakeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeErrorKind::Replay => "replay",
            HandshakeErrorKind::Authentication => "auth",
            HandshakeErrorKind::ProtocolState => "state",
            HandshakeErrorKind::Malformed => "malformed",
            HandshakeErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("nonce not found")]
    NonceNotFound,

    #[error("wrong signature")]
    WrongSignature,

    #[error("checkpoint not found")]
    CheckpointNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("invalid key material: {0}")]
    InvalidKey(#[from] CryptoError),

    #[error("session id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandshakeError {
    pub fn kind(&self) -> HandshakeErrorKind {
        match self {
            HandshakeError::NonceNotFound => HandshakeErrorKind::Replay,
            HandshakeError::WrongSignature => HandshakeErrorKind::Authentication,
            HandshakeError::CheckpointNotFound | HandshakeError::SessionNotFound => {
                HandshakeErrorKind::ProtocolState
            }
            HandshakeError::Malformed(_)
            | HandshakeError::InvalidKey(_)
            | HandshakeError::IdMismatch { .. } => HandshakeErrorKind::Malformed,
            HandshakeError::Internal(_) => HandshakeErrorKind::Internal,
        }
    }

    /// Short machine-checkable reason, without parser or key details
    pub fn public_reason(&self) -> &'static str {
        match self {
            HandshakeError::NonceNotFound => "nonce not found",
            HandshakeError::WrongSignature => "wrong signature",
            HandshakeError::CheckpointNotFound => "checkpoint not found",
            HandshakeError::SessionNotFound => "session not found",
            HandshakeError::Malformed(_)
            | HandshakeError::InvalidKey(_)
            | HandshakeError::IdMismatch { .. } => "malformed request",
            HandshakeError::Internal(_) => "internal error",
        }
    }
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
