//! Anti-replay nonce registry
//!
//! Issues 8-byte random challenges that live for a short TTL and can be consumed once.

use std::time::Duration;
use tracing::debug;

use super::expiring::{ExpiringMap, Sweep};
use super::random_token;

/// Length of a raw nonce before base64 encoding
pub const NONCE_LEN: usize = 8;

/// One-time challenge registry
pub struct NonceRegistry {
    issued: ExpiringMap<()>,
}

impl NonceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            issued: ExpiringMap::new("nonces", ttl),
        }
    }

    /// Mint a fresh nonce. Every call is independent of every other.
    pub fn issue(&self) -> String {
        loop {
            let nonce = random_token(NONCE_LEN);
            if self.issued.insert(nonce.clone(), ()).is_ok() {
                debug!(%nonce, "nonce issued");
                return nonce;
            }
        }
    }

    /// Atomic check-and-delete. `true` exactly once per issued, unexpired nonce.
    pub fn consume(&self, nonce: &str) -> bool {
        let hit = self.issued.take(nonce).is_some();
        debug!(%nonce, hit, "nonce consumed");
        hit
    }

    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }
}

impl Sweep for NonceRegistry {
    fn sweep(&self) -> usize {
        self.issued.sweep()
    }
}
