//! Initiator side of the handshake
//!
//! Pure message logic with no I/O: the client feeds server responses in and gets the
//! next request body out. Each stage consumes the previous one, so a stage can only be
//! used once and only in order.
//!
//! ```text
//! InitiatorHandshake ─ticket_body(nonce)→ POST /ticket
//!                    ─accept_ticket(resp)→ PendingSalt ─salt_body()→ POST /salt
//!                                          PendingSalt ─accept_salt(resp)→ Admission
//! ```

use zeroize::Zeroizing;

use super::error::{HandshakeError, HandshakeResult};
use super::messages::{join_pair, split_pair};
use crate::core_crypto::{
    decode_b64, DirectionKeys, EphemeralKeyPair, Role, SigningIdentity, SALT_LEN, SHARED_SECRET_LEN,
};

/// Start of a handshake, holding the long-term signing identity
pub struct InitiatorHandshake {
    identity: SigningIdentity,
}

impl InitiatorHandshake {
    pub fn new(identity: SigningIdentity) -> Self {
        Self { identity }
    }

    /// `nonce.signature(nonce)`
    pub fn ticket_body(&self, nonce: &str) -> HandshakeResult<String> {
        let nonce = nonce.trim();
        let signature = self.identity.sign_token(nonce)?;
        Ok(join_pair(nonce, &signature))
    }

    /// Agree with the server's ephemeral key and sign the session id.
    pub fn accept_ticket(&self, response: &str) -> HandshakeResult<PendingSalt> {
        let (id, server_public) = split_pair(response)?;

        let key_pair = EphemeralKeyPair::generate();
        let public = key_pair.public_spki_b64()?;
        let shared = key_pair.agree(server_public)?;
        let token = self.identity.sign_token(id)?;

        Ok(PendingSalt {
            id: id.to_string(),
            token,
            shared,
            salt_body: join_pair(id, &public),
        })
    }
}

/// Shared secret established; waiting for the server's salt
pub struct PendingSalt {
    id: String,
    token: String,
    shared: Zeroizing<[u8; SHARED_SECRET_LEN]>,
    salt_body: String,
}

impl PendingSalt {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `id.ourEphemeralPublicKey`
    pub fn salt_body(&self) -> &str {
        &self.salt_body
    }

    pub fn accept_salt(self, response: &str) -> HandshakeResult<Admission> {
        let (id, salt) = split_pair(response)?;
        if id != self.id {
            return Err(HandshakeError::IdMismatch {
                expected: self.id,
                actual: id.to_string(),
            });
        }

        let salt = decode_b64(salt).map_err(|e| HandshakeError::Malformed(e.to_string()))?;
        if salt.len() != SALT_LEN {
            return Err(HandshakeError::Malformed(format!(
                "salt is {} bytes, expected {}",
                salt.len(),
                SALT_LEN
            )));
        }

        let keys = DirectionKeys::derive(&self.shared[..], &salt, Role::Initiator)?;
        Ok(Admission {
            id: self.id,
            token: self.token,
            keys,
        })
    }
}

/// Everything needed to open `/sessions/{id}?token=...`
pub struct Admission {
    pub id: String,
    pub token: String,
    keys: DirectionKeys,
}

impl Admission {
    pub fn keys(&self) -> &DirectionKeys {
        &self.keys
    }

    pub fn into_parts(self) -> (String, String, DirectionKeys) {
        (self.id, self.token, self.keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_crypto::encode_b64;

    #[test]
    fn test_ticket_body_signs_decoded_nonce() {
        let identity = SigningIdentity::generate();
        let nonce = encode_b64([1u8, 2, 3, 4, 5, 6, 7, 8]);

        let body = InitiatorHandshake::new(identity.clone()).ticket_body(&nonce).unwrap();
        let (echoed, signature) = split_pair(&body).unwrap();

        assert_eq!(echoed, nonce);
        assert!(identity.trust_anchor().verify_token(&nonce, signature).unwrap());
    }

    #[test]
    fn test_ticket_body_rejects_non_base64_nonce() {
        let initiator = InitiatorHandshake::new(SigningIdentity::generate());
        assert!(matches!(
            initiator.ticket_body("not base64!"),
            Err(HandshakeError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_accept_ticket_rejects_garbage() {
        let initiator = InitiatorHandshake::new(SigningIdentity::generate());
        assert!(initiator.accept_ticket("no-dot").is_err());
        assert!(initiator.accept_ticket("AAAAAAAAAAA=.AAAA").is_err());
    }

    #[test]
    fn test_salt_id_must_match() {
        let initiator = InitiatorHandshake::new(SigningIdentity::generate());
        let server = EphemeralKeyPair::generate();
        let ticket = join_pair("AAAAAAAAAAA=", &server.public_spki_b64().unwrap());

        let pending = initiator.accept_ticket(&ticket).unwrap();
        let result = pending.accept_salt(&join_pair("BBBBBBBBBBB=", &encode_b64([0u8; 32])));
        assert!(matches!(result, Err(HandshakeError::IdMismatch { .. })));
    }

    #[test]
    fn test_salt_length_checked() {
        let initiator = InitiatorHandshake::new(SigningIdentity::generate());
        let server = EphemeralKeyPair::generate();
        let ticket = join_pair("AAAAAAAAAAA=", &server.public_spki_b64().unwrap());

        let pending = initiator.accept_ticket(&ticket).unwrap();
        let result = pending.accept_salt(&join_pair("AAAAAAAAAAA=", &encode_b64([0u8; 16])));
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }
}
