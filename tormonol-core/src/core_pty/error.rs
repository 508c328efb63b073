use thiserror::Error;

/// Pseudo-terminal failures
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Failed to open pty: {0}")]
    Open(String),

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Kill failed: {0}")]
    Kill(String),

    #[error("Process input closed")]
    InputClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PtyResult<T> = Result<T, PtyError>;
