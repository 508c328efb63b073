/*
    HandshakeCoordinator - responder side of the four-step handshake

    Stateless apart from the three stores. Each step consumes what the previous one
    left behind and leaves exactly one entry for the next.

    1. challenge()              → nonce                      NonceRegistry.issue
    2. ticket("nonce.sig")      → "id.serverSpki"            NonceRegistry.consume, verify,
                                                             CheckpointStore.open
    3. salt("id.peerSpki")      → "id.salt"                  CheckpointStore.take, ECDH, HKDF,
                                                             SessionKeyStore.store
    4. admit(id, sig(id))       → DirectionKeys              verify, SessionKeyStore.take

    Failures are final. The peer starts over at step 1.
*/

use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{HandshakeError, HandshakeErrorKind, HandshakeResult};
use super::messages::{join_pair, split_pair};
use crate::config::HandshakeConfig;
use crate::core_crypto::{encode_b64, DirectionKeys, EphemeralKeyPair, Role, TrustAnchor, SALT_LEN};
use crate::core_registry::{spawn_sweeper, CheckpointStore, NonceRegistry, SessionKeyStore, Sweep};
use crate::metrics;

/// Sizes of the three handshake stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSizes {
    pub nonces: usize,
    pub checkpoints: usize,
    pub session_keys: usize,
}

pub struct HandshakeCoordinator {
    trust: TrustAnchor,
    nonces: Arc<NonceRegistry>,
    checkpoints: Arc<CheckpointStore>,
    session_keys: Arc<SessionKeyStore>,
}

impl HandshakeCoordinator {
    pub fn new(trust: TrustAnchor, config: &HandshakeConfig) -> Self {
        Self {
            trust,
            nonces: Arc::new(NonceRegistry::new(config.nonce_ttl)),
            checkpoints: Arc::new(CheckpointStore::new(config.checkpoint_ttl)),
            session_keys: Arc::new(SessionKeyStore::new(config.session_key_ttl)),
        }
    }

    /// Step 1: a fresh nonce. Every call is independent.
    pub fn challenge(&self) -> String {
        let nonce = self.nonces.issue();
        metrics::handshake_step("challenge", "ok");
        nonce
    }

    /// Step 2: `nonce.signature` → `id.serverEphemeralPublicKey`
    pub fn ticket(&self, body: &str) -> HandshakeResult<String> {
        observe("ticket", || {
            let (nonce, signature) = split_pair(body)?;

            // Consume before verifying so a nonce never survives a failed attempt.
            if !self.nonces.consume(nonce) {
                return Err(HandshakeError::NonceNotFound);
            }

            if !self.verify(nonce, signature)? {
                return Err(HandshakeError::WrongSignature);
            }

            let key_pair = EphemeralKeyPair::generate();
            let public = key_pair.public_spki_b64()?;
            let id = self.checkpoints.open(key_pair);

            debug!(session = %id, "ticket issued");
            Ok(join_pair(&id, &public))
        })
    }

    /// Step 3: `id.peerEphemeralPublicKey` → `id.salt`
    pub fn salt(&self, body: &str) -> HandshakeResult<String> {
        observe("salt", || {
            let (id, peer_public) = split_pair(body)?;

            let key_pair = self
                .checkpoints
                .take(id)
                .ok_or(HandshakeError::CheckpointNotFound)?;
            let shared = key_pair.agree(peer_public)?;

            let mut salt = [0u8; SALT_LEN];
            rand::rngs::OsRng.fill_bytes(&mut salt);

            let keys = DirectionKeys::derive(&shared[..], &salt, Role::Responder)?;
            if !self.session_keys.store(id, keys) {
                return Err(HandshakeError::Internal(format!(
                    "session keys already pending for {}",
                    id
                )));
            }

            debug!(session = %id, "session keys derived");
            Ok(join_pair(id, &encode_b64(salt)))
        })
    }

    /// Step 4: check `token` signs `id`, then hand over the session keys exactly once.
    /// Nothing is consumed when the signature fails.
    pub fn admit(&self, id: &str, token: &str) -> HandshakeResult<DirectionKeys> {
        observe("admission", || {
            if !self.verify(id, token)? {
                return Err(HandshakeError::WrongSignature);
            }

            let keys = self
                .session_keys
                .take(id)
                .ok_or(HandshakeError::SessionNotFound)?;

            debug!(session = %id, "session admitted");
            Ok(keys)
        })
    }

    fn verify(&self, token: &str, signature: &str) -> HandshakeResult<bool> {
        self.trust
            .verify_token(token, signature)
            .map_err(|e| HandshakeError::Malformed(e.to_string()))
    }

    pub fn store_sizes(&self) -> StoreSizes {
        StoreSizes {
            nonces: self.nonces.outstanding(),
            checkpoints: self.checkpoints.len(),
            session_keys: self.session_keys.len(),
        }
    }

    /// Start one periodic sweeper per store
    pub fn spawn_sweepers(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        let stores: [Arc<dyn Sweep>; 3] = [
            self.nonces.clone(),
            self.checkpoints.clone(),
            self.session_keys.clone(),
        ];
        stores
            .into_iter()
            .map(|store| spawn_sweeper(store, interval))
            .collect()
    }
}

/// Run one step, recording its outcome and logging rejections.
fn observe<T>(step: &'static str, f: impl FnOnce() -> HandshakeResult<T>) -> HandshakeResult<T> {
    let started = Instant::now();
    let result = f();
    metrics::handshake_step_duration(step, started.elapsed().as_secs_f64());

    match &result {
        Ok(_) => metrics::handshake_step(step, "ok"),
        Err(e) => {
            metrics::handshake_step(step, e.kind().as_str());
            match e.kind() {
                HandshakeErrorKind::Internal => warn!(step, error = %e, "handshake step failed"),
                _ => warn!(step, reason = %e, "handshake rejected"),
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::{decode_b64, SigningIdentity};
    use crate::core_handshake::InitiatorHandshake;

    fn setup() -> (HandshakeCoordinator, SigningIdentity) {
        let identity = SigningIdentity::generate();
        let coordinator =
            HandshakeCoordinator::new(identity.trust_anchor(), &HandshakeConfig::default());
        (coordinator, identity)
    }

    /// Steps 1-3, returning the admission id and token
    fn through_salt(
        coordinator: &HandshakeCoordinator,
        identity: &SigningIdentity,
    ) -> (String, String, DirectionKeys) {
        let initiator = InitiatorHandshake::new(identity.clone());
        let nonce = coordinator.challenge();
        let ticket = coordinator.ticket(&initiator.ticket_body(&nonce).unwrap()).unwrap();
        let pending = initiator.accept_ticket(&ticket).unwrap();
        let salt = coordinator.salt(pending.salt_body()).unwrap();
        let admission = pending.accept_salt(&salt).unwrap();
        let (id, token, keys) = admission.into_parts();
        (id, token, keys)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_handshake_keys_mirror() {
        let (coordinator, identity) = setup();
        let (id, token, client_keys) = through_salt(&coordinator, &identity);

        let server_keys = coordinator.admit(&id, &token).unwrap();
        assert_eq!(client_keys.encrypt_key(), server_keys.decrypt_key());
        assert_eq!(client_keys.decrypt_key(), server_keys.encrypt_key());
        assert_eq!(coordinator.store_sizes().session_keys, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_response_shape() {
        let (coordinator, identity) = setup();
        let nonce = coordinator.challenge();
        let body = InitiatorHandshake::new(identity).ticket_body(&nonce).unwrap();

        let response = coordinator.ticket(&body).unwrap();
        let (id, spki) = split_pair(&response).unwrap();
        assert_eq!(decode_b64(id).unwrap().len(), 8);
        assert_eq!(decode_b64(spki).unwrap()[0], 0x30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nonce_cannot_be_replayed() {
        let (coordinator, identity) = setup();
        let initiator = InitiatorHandshake::new(identity);
        let body = initiator.ticket_body(&coordinator.challenge()).unwrap();

        assert!(coordinator.ticket(&body).is_ok());
        assert!(matches!(
            coordinator.ticket(&body),
            Err(HandshakeError::NonceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_nonce() {
        let (coordinator, identity) = setup();
        let body = InitiatorHandshake::new(identity)
            .ticket_body("AAAAAAAAAAA=")
            .unwrap();
        assert!(matches!(
            coordinator.ticket(&body),
            Err(HandshakeError::NonceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_nonce() {
        let (coordinator, identity) = setup();
        let nonce = coordinator.challenge();
        let body = InitiatorHandshake::new(identity).ticket_body(&nonce).unwrap();

        tokio::time::advance(Duration::from_millis(3_001)).await;
        assert!(matches!(
            coordinator.ticket(&body),
            Err(HandshakeError::NonceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_signer_burns_nonce() {
        let (coordinator, identity) = setup();
        let intruder = InitiatorHandshake::new(SigningIdentity::generate());
        let nonce = coordinator.challenge();

        let forged = intruder.ticket_body(&nonce).unwrap();
        assert!(matches!(
            coordinator.ticket(&forged),
            Err(HandshakeError::WrongSignature)
        ));

        let genuine = InitiatorHandshake::new(identity).ticket_body(&nonce).unwrap();
        assert!(matches!(
            coordinator.ticket(&genuine),
            Err(HandshakeError::NonceNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_single_use() {
        let (coordinator, identity) = setup();
        let initiator = InitiatorHandshake::new(identity);
        let ticket = coordinator
            .ticket(&initiator.ticket_body(&coordinator.challenge()).unwrap())
            .unwrap();
        let pending = initiator.accept_ticket(&ticket).unwrap();

        assert!(coordinator.salt(pending.salt_body()).is_ok());
        assert!(matches!(
            coordinator.salt(pending.salt_body()),
            Err(HandshakeError::CheckpointNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_salt_rejects_bad_peer_key() {
        let (coordinator, identity) = setup();
        let initiator = InitiatorHandshake::new(identity);
        let ticket = coordinator
            .ticket(&initiator.ticket_body(&coordinator.challenge()).unwrap())
            .unwrap();
        let (id, _) = split_pair(&ticket).unwrap();

        let err = coordinator.salt(&join_pair(id, "AAAA")).unwrap_err();
        assert_eq!(err.kind(), HandshakeErrorKind::Malformed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_admission_fails() {
        let (coordinator, identity) = setup();
        let (id, token, _) = through_salt(&coordinator, &identity);

        assert!(coordinator.admit(&id, &token).is_ok());
        assert!(matches!(
            coordinator.admit(&id, &token),
            Err(HandshakeError::SessionNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_admission_signature_keeps_keys() {
        let (coordinator, identity) = setup();
        let (id, token, _) = through_salt(&coordinator, &identity);

        let forged = SigningIdentity::generate().sign_token(&id).unwrap();
        assert!(matches!(
            coordinator.admit(&id, &forged),
            Err(HandshakeError::WrongSignature)
        ));
        assert!(coordinator.admit(&id, &token).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_keys_expire() {
        let (coordinator, identity) = setup();
        let (id, token, _) = through_salt(&coordinator, &identity);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(
            coordinator.admit(&id, &token),
            Err(HandshakeError::SessionNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweepers_empty_stores() {
        let (coordinator, _) = setup();
        for _ in 0..5 {
            coordinator.challenge();
        }
        let handles = coordinator.spawn_sweepers(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(coordinator.store_sizes().nonces, 0);

        for handle in handles {
            handle.abort();
        }
    }
}
