//! Handshake registries
//!
//! The three process-wide stores the handshake moves through:
//! nonce registry → checkpoint store → session key store. Each entry is written by one
//! step and taken by the next, exactly once.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use std::time::Duration;

use crate::core_crypto::{DirectionKeys, EphemeralKeyPair};

mod expiring;
mod nonce;

pub use expiring::{spawn_sweeper, ExpiringMap, Sweep};
pub use nonce::{NonceRegistry, NONCE_LEN};

/// Length of a raw session id before base64 encoding
pub const SESSION_ID_LEN: usize = 8;

/// `len` random bytes, standard padded base64
pub fn random_token(len: usize) -> String {
    let mut raw = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    BASE64.encode(raw)
}

/// Server ephemeral ECDH secrets awaiting the peer's half, keyed by session id
pub struct CheckpointStore {
    inner: ExpiringMap<EphemeralKeyPair>,
}

impl CheckpointStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ExpiringMap::new("checkpoints", ttl),
        }
    }

    /// Park `key_pair` under a freshly minted session id and return the id.
    pub fn open(&self, key_pair: EphemeralKeyPair) -> String {
        let mut key_pair = key_pair;
        loop {
            let id = random_token(SESSION_ID_LEN);
            match self.inner.insert(id.clone(), key_pair) {
                Ok(()) => return id,
                Err(returned) => key_pair = returned,
            }
        }
    }

    pub fn take(&self, id: &str) -> Option<EphemeralKeyPair> {
        self.inner.take(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Sweep for CheckpointStore {
    fn sweep(&self) -> usize {
        self.inner.sweep()
    }
}

/// Derived direction keys awaiting socket admission, keyed by session id
pub struct SessionKeyStore {
    inner: ExpiringMap<DirectionKeys>,
}

impl SessionKeyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: ExpiringMap::new("session_keys", ttl),
        }
    }

    /// Returns `false` if keys for `id` are already waiting.
    pub fn store(&self, id: &str, keys: DirectionKeys) -> bool {
        self.inner.insert(id, keys).is_ok()
    }

    pub fn take(&self, id: &str) -> Option<DirectionKeys> {
        self.inner.take(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Sweep for SessionKeyStore {
    fn sweep(&self) -> usize {
        self.inner.sweep()
    }
}
