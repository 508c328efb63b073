//! Ephemeral ECDH P-256 key agreement
//!
//! Public halves travel as base64 SubjectPublicKeyInfo DER.

use p256::ecdh::EphemeralSecret;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::PublicKey;
use std::fmt;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::{decode_b64, encode_b64};

/// Length of the raw ECDH shared secret
pub const SHARED_SECRET_LEN: usize = 32;

/// One-shot ECDH key pair. Lives in a checkpoint between the ticket and salt steps.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public_spki_der(&self) -> CryptoResult<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    pub fn public_spki_b64(&self) -> CryptoResult<String> {
        Ok(encode_b64(self.public_spki_der()?))
    }

    /// Agree with a peer's base64 SPKI public key, consuming the secret.
    pub fn agree(self, peer_spki_b64: &str) -> CryptoResult<Zeroizing<[u8; SHARED_SECRET_LEN]>> {
        let der = decode_b64(peer_spki_b64)?;
        let peer = PublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

        let shared = self.secret.diffie_hellman(&peer);
        let mut out = Zeroizing::new([0u8; SHARED_SECRET_LEN]);
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair").finish_non_exhaustive()
    }
}
