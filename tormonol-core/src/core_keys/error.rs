use thiserror::Error;

use crate::core_crypto::CryptoError;

/// Key store errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] CryptoError),

    #[error("Invalid password")]
    InvalidPassword,
}
