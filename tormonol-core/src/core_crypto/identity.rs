//! Long-term signing identity (ECDSA P-256 / SHA-256)
//!
//! Signatures travel as the fixed 64-byte `r || s` encoding used by WebCrypto, base64
//! encoded. Verification also accepts ASN.1 DER so keys driven from OpenSSL work.
//! Every signed message is a server-chosen token (nonce or session id), signed over its
//! decoded bytes.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::{decode_b64, encode_b64};

/// Private half, held only by the peer
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
}

impl SigningIdentity {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_pkcs8_der(der: &[u8]) -> CryptoResult<Self> {
        SigningKey::from_pkcs8_der(der)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    pub fn from_pkcs8_pem(pem: &str) -> CryptoResult<Self> {
        SigningKey::from_pkcs8_pem(pem)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    pub fn to_pkcs8_der(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let doc = self
            .key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    pub fn to_pkcs8_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Raw `r || s` signature over `message`
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.key.sign(message);
        signature.to_bytes().to_vec()
    }

    /// Sign the decoded bytes of a base64 token, returning the base64 signature.
    pub fn sign_token(&self, token: &str) -> CryptoResult<String> {
        let message = decode_b64(token)?;
        Ok(encode_b64(self.sign(&message)))
    }

    pub fn trust_anchor(&self) -> TrustAnchor {
        TrustAnchor {
            key: *self.key.verifying_key(),
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("public", &self.trust_anchor())
            .finish_non_exhaustive()
    }
}

/// Public half, the server's only trust anchor
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    key: VerifyingKey,
}

impl TrustAnchor {
    pub fn from_spki_pem(pem: &str) -> CryptoResult<Self> {
        VerifyingKey::from_public_key_pem(pem.trim())
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        VerifyingKey::from_public_key_der(der)
            .map(|key| Self { key })
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Read the authorized key file once, at startup
    pub fn load(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_spki_pem(&pem)
    }

    pub fn to_spki_pem(&self) -> CryptoResult<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn to_spki_der(&self) -> CryptoResult<Vec<u8>> {
        self.key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let parsed = if signature.len() == 64 {
            Signature::from_slice(signature)
        } else {
            Signature::from_der(signature)
        };

        match parsed {
            Ok(signature) => self.key.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }

    /// Verify a base64 signature over the decoded bytes of a base64 token.
    /// Fails with an error only when either value is not valid base64.
    pub fn verify_token(&self, token: &str, signature: &str) -> CryptoResult<bool> {
        let message = decode_b64(token)?;
        let signature = decode_b64(signature)?;
        Ok(self.verify(&message, &signature))
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let point = self.key.to_encoded_point(true);
        write!(f, "TrustAnchor({})", hex_prefix(point.as_bytes()))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}
