//! Direction key derivation
//!
//! HKDF-SHA256 over the ECDH shared secret, salted with the server's 32 random bytes.
//! Each traffic direction gets its own AES-128-GCM key, bound to it through the HKDF
//! info string. Which key a side encrypts with depends on its [`Role`].

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{CryptoError, CryptoResult};

pub const DIRECTION_KEY_LEN: usize = 16;
pub const SALT_LEN: usize = 32;

pub const CLIENT_TO_SERVER_INFO: &[u8] = b"client -> server";
pub const SERVER_TO_CLIENT_INFO: &[u8] = b"server -> client";

/// Side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connecting peer; sends on client -> server
    Initiator,
    /// Terminal host; sends on server -> client
    Responder,
}

/// The two AES-128-GCM keys of one session, already oriented for one side
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DirectionKeys {
    encrypt: [u8; DIRECTION_KEY_LEN],
    decrypt: [u8; DIRECTION_KEY_LEN],
    #[zeroize(skip)]
    role: Role,
}

impl DirectionKeys {
    /// Orient already-derived keys for `role`.
    pub fn from_raw(
        client_to_server: [u8; DIRECTION_KEY_LEN],
        server_to_client: [u8; DIRECTION_KEY_LEN],
        role: Role,
    ) -> Self {
        let (encrypt, decrypt) = match role {
            Role::Initiator => (client_to_server, server_to_client),
            Role::Responder => (server_to_client, client_to_server),
        };
        Self {
            encrypt,
            decrypt,
            role,
        }
    }

    pub fn derive(shared_secret: &[u8], salt: &[u8], role: Role) -> CryptoResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);

        let mut c2s = [0u8; DIRECTION_KEY_LEN];
        let mut s2c = [0u8; DIRECTION_KEY_LEN];
        hk.expand(CLIENT_TO_SERVER_INFO, &mut c2s)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        hk.expand(SERVER_TO_CLIENT_INFO, &mut s2c)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let keys = Self::from_raw(c2s, s2c, role);
        c2s.zeroize();
        s2c.zeroize();
        Ok(keys)
    }

    pub fn encrypt_key(&self) -> &[u8; DIRECTION_KEY_LEN] {
        &self.encrypt
    }

    pub fn decrypt_key(&self) -> &[u8; DIRECTION_KEY_LEN] {
        &self.decrypt
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Debug for DirectionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionKeys")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
