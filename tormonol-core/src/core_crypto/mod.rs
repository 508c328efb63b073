//! Cryptographic building blocks for the handshake
//!
//! - [`identity`]: long-term ECDSA P-256 signing identity and the server-side trust anchor
//! - [`kex`]: ephemeral ECDH P-256 key pairs exchanged as SPKI DER
//! - [`kdf`]: HKDF-SHA256 derivation of the two AES-128-GCM direction keys

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub mod error;
pub mod identity;
pub mod kdf;
pub mod kex;

pub use error::{CryptoError, CryptoResult};
pub use identity::{SigningIdentity, TrustAnchor};
pub use kdf::{DirectionKeys, Role, DIRECTION_KEY_LEN, SALT_LEN};
pub use kex::{EphemeralKeyPair, SHARED_SECRET_LEN};

/// Standard padded base64, the only text encoding on the wire
pub fn encode_b64(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

pub fn decode_b64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(text)
}
