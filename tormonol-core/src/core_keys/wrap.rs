//! Password wrapping for key material at rest
//!
//! Wrapped Format:
//! ```text
//! [Magic: 8 bytes "TMNLKEY1"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! Argon2id stretches the password with a random per-wrap salt into an AES-256-GCM
//! key. A tag mismatch is reported as a wrong password.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use zeroize::Zeroizing;

use super::error::KeystoreError;

/// Magic header for wrapped key files
const MAGIC_HEADER: &[u8; 8] = b"TMNLKEY1";

/// Current format version
const FORMAT_VERSION: u8 = 1;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Header size: magic(8) + version(1) + salt(16) + nonce(12) = 37 bytes
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

const TAG_LEN: usize = 16;

/// Encrypt `secret` under `password`
pub fn wrap(password: &str, secret: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let key = derive_key_from_password(password, &salt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| KeystoreError::Encryption(format!("Invalid key: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|e| KeystoreError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    result.extend_from_slice(MAGIC_HEADER);
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a wrapped blob. `InvalidPassword` on tag mismatch.
pub fn unwrap(password: &str, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    if data.len() < HEADER_SIZE + TAG_LEN {
        return Err(KeystoreError::Decryption("Truncated file".to_string()));
    }
    if &data[0..8] != MAGIC_HEADER {
        return Err(KeystoreError::Decryption("Invalid magic header".to_string()));
    }
    let version = data[8];
    if version != FORMAT_VERSION {
        return Err(KeystoreError::Decryption(format!(
            "Unsupported version: {}",
            version
        )));
    }

    let salt = &data[9..9 + SALT_LEN];
    let nonce = Nonce::from_slice(&data[9 + SALT_LEN..HEADER_SIZE]);
    let ciphertext = &data[HEADER_SIZE..];

    let key = derive_key_from_password(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| KeystoreError::Decryption(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(nonce, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| KeystoreError::InvalidPassword)
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(
    password: &str,
    salt: &[u8],
) -> Result<Zeroizing<[u8; 32]>, KeystoreError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),
    )
    .map_err(|e| KeystoreError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| KeystoreError::Encryption(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap() {
        let wrapped = wrap("hunter2", b"pkcs8 bytes").unwrap();
        assert_eq!(&wrapped[0..8], MAGIC_HEADER);
        assert_eq!(unwrap("hunter2", &wrapped).unwrap().as_slice(), b"pkcs8 bytes");
    }

    #[test]
    fn test_wrong_password() {
        let wrapped = wrap("hunter2", b"secret").unwrap();
        assert!(matches!(
            unwrap("hunter3", &wrapped),
            Err(KeystoreError::InvalidPassword)
        ));
    }

    #[test]
    fn test_salt_and_nonce_fresh_per_wrap() {
        let a = wrap("pw", b"same").unwrap();
        let b = wrap("pw", b"same").unwrap();
        assert_ne!(&a[9..HEADER_SIZE], &b[9..HEADER_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_header_rejected() {
        let mut wrapped = wrap("pw", b"secret").unwrap();
        wrapped[0] = b'X';
        assert!(matches!(unwrap("pw", &wrapped), Err(KeystoreError::Decryption(_))));

        assert!(matches!(unwrap("pw", b"short"), Err(KeystoreError::Decryption(_))));
    }
}
