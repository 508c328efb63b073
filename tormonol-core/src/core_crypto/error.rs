use thiserror::Error;

/// Failures while parsing or using key material
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
