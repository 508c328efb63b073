//! Signing key storage for the peer
//!
//! The private key lives as a password-wrapped PKCS#8 document; the public key sits
//! next to it as SPKI PEM, ready to be copied to the server's authorized key path.
//!
//! ```text
//! <dir>/identity.key.enc   wrapped PKCS#8 DER
//! <dir>/identity.pub.pem   SPKI PEM
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core_crypto::{SigningIdentity, TrustAnchor};

mod error;
pub mod wrap;

pub use error::KeystoreError;

const PRIVATE_FILE: &str = "identity.key.enc";
const PUBLIC_FILE: &str = "identity.pub.pem";

/// Directory holding one wrapped signing identity
pub struct KeyStore {
    base_path: PathBuf,
}

impl KeyStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// `tormonol` under the platform config directory (`~/.config/tormonol` on Linux)
    pub fn default_location() -> Self {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("tormonol"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn private_path(&self) -> PathBuf {
        self.base_path.join(PRIVATE_FILE)
    }

    pub fn public_path(&self) -> PathBuf {
        self.base_path.join(PUBLIC_FILE)
    }

    pub fn exists(&self) -> bool {
        self.private_path().exists()
    }

    /// Generate and store a new identity. Refuses to overwrite unless `force`.
    pub fn generate(&self, password: &str, force: bool) -> Result<SigningIdentity, KeystoreError> {
        if self.exists() && !force {
            return Err(KeystoreError::AlreadyExists(
                self.private_path().display().to_string(),
            ));
        }
        let identity = SigningIdentity::generate();
        self.save(&identity, password)?;
        info!(path = %self.base_path.display(), "signing identity generated");
        Ok(identity)
    }

    pub fn save(&self, identity: &SigningIdentity, password: &str) -> Result<(), KeystoreError> {
        fs::create_dir_all(&self.base_path)?;

        let der = identity.to_pkcs8_der()?;
        let wrapped = wrap::wrap(password, &der)?;
        write_atomic(&self.private_path(), &wrapped)?;

        let public_pem = identity.trust_anchor().to_spki_pem()?;
        write_atomic(&self.public_path(), public_pem.as_bytes())?;
        Ok(())
    }

    /// Unwrap the private key. `NotFound` and `InvalidPassword` are distinct.
    pub fn unlock(&self, password: &str) -> Result<SigningIdentity, KeystoreError> {
        let path = self.private_path();
        if !path.exists() {
            return Err(KeystoreError::NotFound(path.display().to_string()));
        }

        let wrapped = fs::read(&path)?;
        let der = wrap::unwrap(password, &wrapped)?;
        let identity = SigningIdentity::from_pkcs8_der(&der)?;
        debug!(path = %path.display(), "signing identity unlocked");
        Ok(identity)
    }

    pub fn public_key(&self) -> Result<TrustAnchor, KeystoreError> {
        let path = self.public_path();
        if !path.exists() {
            return Err(KeystoreError::NotFound(path.display().to_string()));
        }
        Ok(TrustAnchor::load(&path)?)
    }
}

/// Write file atomically (write to temp, then rename)
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), KeystoreError> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_and_unlock() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());

        let identity = store.generate("password123", false).unwrap();
        let unlocked = store.unlock("password123").unwrap();

        assert_eq!(identity.trust_anchor(), unlocked.trust_anchor());
        assert_eq!(store.public_key().unwrap(), identity.trust_anchor());
    }

    #[test]
    fn test_not_found_and_wrong_password_are_distinct() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path().join("missing"));
        assert!(matches!(store.unlock("pw"), Err(KeystoreError::NotFound(_))));

        let store = KeyStore::new(dir.path());
        store.generate("right", false).unwrap();
        assert!(matches!(store.unlock("wrong"), Err(KeystoreError::InvalidPassword)));
    }

    #[test]
    fn test_no_silent_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());

        let first = store.generate("pw", false).unwrap();
        assert!(matches!(
            store.generate("pw", false),
            Err(KeystoreError::AlreadyExists(_))
        ));

        let second = store.generate("pw", true).unwrap();
        assert_ne!(first.trust_anchor(), second.trust_anchor());
    }

    #[test]
    fn test_public_pem_is_loadable_as_trust_anchor() {
        let dir = TempDir::new().unwrap();
        let store = KeyStore::new(dir.path());
        let identity = store.generate("pw", false).unwrap();

        let anchor = TrustAnchor::load(store.public_path()).unwrap();
        let signature = identity.sign(b"nonce");
        assert!(anchor.verify(b"nonce", &signature));
    }
}
