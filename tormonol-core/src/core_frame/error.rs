use thiserror::Error;

/// Frame codec failures. None of these are fatal to a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown frame type: {0}")]
    UnknownType(u8),

    #[error("Truncated data frame: {len} bytes")]
    Truncated { len: usize },

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed: authentication tag mismatch")]
    Decrypt,

    #[error("Queue closed")]
    QueueClosed,
}

impl FrameError {
    /// Short label for the `frames_dropped_total` counter
    pub fn cause(&self) -> &'static str {
        match self {
            FrameError::Empty | FrameError::UnknownType(_) | FrameError::Truncated { .. } => {
                "malformed"
            }
            FrameError::InvalidDimensions(_) => "bad_resize",
            FrameError::Encrypt | FrameError::Decrypt => "crypto",
            FrameError::QueueClosed => "closed",
        }
    }
}

pub type FrameResult<T> = Result<T, FrameError>;
