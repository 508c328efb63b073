//! AES-128-GCM for one traffic direction
//!
//! Every sealed message gets a fresh random 96-bit IV. Keys are per session and per
//! direction, so the random IV space is never shared between senders.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::RngCore;

use super::error::{FrameError, FrameResult};
use super::frame::{Frame, IV_LEN};
use crate::core_crypto::DIRECTION_KEY_LEN;

/// One-direction AEAD. Holds the key schedule only, never the raw key.
pub struct FrameCipher {
    aead: Aes128Gcm,
}

impl FrameCipher {
    pub fn new(key: &[u8; DIRECTION_KEY_LEN]) -> Self {
        Self {
            aead: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
        }
    }

    /// Encrypt `plaintext` into a DATA frame under a fresh IV.
    pub fn seal(&self, plaintext: &[u8]) -> FrameResult<Frame> {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| FrameError::Encrypt)?;

        Ok(Frame::Data { iv, ciphertext })
    }

    /// Decrypt and authenticate the body of a DATA frame.
    pub fn open(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> FrameResult<Vec<u8>> {
        self.aead
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| FrameError::Decrypt)
    }

    /// Decode and decrypt raw DATA frame bytes.
    pub fn open_frame(&self, bytes: &[u8]) -> FrameResult<Vec<u8>> {
        match Frame::decode(bytes)? {
            Frame::Data { iv, ciphertext } => self.open(&iv, &ciphertext),
            Frame::Resize(_) => Err(FrameError::UnknownType(bytes[0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_frame::frame::TAG_LEN;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn pair() -> (FrameCipher, FrameCipher) {
        let key = [0x42u8; DIRECTION_KEY_LEN];
        (FrameCipher::new(&key), FrameCipher::new(&key))
    }

    #[test]
    fn test_seal_open() {
        let (sender, receiver) = pair();
        let frame = sender.seal(b"ls\n").unwrap();

        let bytes = frame.encode();
        assert_eq!(bytes.len(), 1 + IV_LEN + 3 + TAG_LEN);
        assert_eq!(receiver.open_frame(&bytes).unwrap(), b"ls\n");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sender = FrameCipher::new(&[1u8; 16]);
        let receiver = FrameCipher::new(&[2u8; 16]);

        let bytes = sender.seal(b"secret").unwrap().encode();
        assert_eq!(receiver.open_frame(&bytes), Err(FrameError::Decrypt));
    }

    #[test]
    fn test_resize_is_not_data() {
        let (_, receiver) = pair();
        assert!(receiver.open_frame(b"\x0180,24").is_err());
    }

    #[test]
    fn test_ivs_are_distinct() {
        let (sender, _) = pair();
        let ivs: HashSet<[u8; IV_LEN]> = (0..1000)
            .map(|_| match sender.seal(b"x").unwrap() {
                Frame::Data { iv, .. } => iv,
                Frame::Resize(_) => unreachable!(),
            })
            .collect();
        assert_eq!(ivs.len(), 1000);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let (sender, receiver) = pair();
            let bytes = sender.seal(&plaintext).unwrap().encode();
            prop_assert_eq!(receiver.open_frame(&bytes).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_bit_flip_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 1..64),
            bit in any::<prop::sample::Index>(),
        ) {
            let (sender, receiver) = pair();
            let mut bytes = sender.seal(&plaintext).unwrap().encode();

            // Skip the type byte; flipping it is a structural error, not a crypto one.
            let body_bits = (bytes.len() - 1) * 8;
            let target = bit.index(body_bits);
            bytes[1 + target / 8] ^= 1 << (target % 8);

            prop_assert_eq!(receiver.open_frame(&bytes), Err(FrameError::Decrypt));
        }
    }
}
