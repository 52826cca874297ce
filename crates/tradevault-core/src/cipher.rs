//! Authenticated encryption for credential material at rest.
//!
//! One process-wide AES-256-GCM key, loaded once at startup from the
//! environment and injected into every component that needs it. Encryption
//! is non-deterministic: a fresh 12-byte nonce is drawn per call and
//! prepended to the ciphertext, so identical plaintexts never produce
//! identical stored bytes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use tracing::warn;

use crate::error::{Error, Result};
use crate::secret::SecretBytes;

/// Environment variable holding the base64-encoded 32-byte master key.
pub const MASTER_KEY_ENV: &str = "TRADEVAULT_MASTER_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// The process-wide encryption key. Immutable after construction; the raw
/// bytes are zeroized on drop and redacted from debug output.
pub struct MasterKey {
    bytes: SecretVec<u8>,
}

impl MasterKey {
    /// Wraps raw key bytes, rejecting anything but a 32-byte key.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(Error::configuration(format!(
                "master key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: SecretVec::new(bytes),
        })
    }

    /// Decodes a base64 key as stored in [`MASTER_KEY_ENV`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::configuration("master key is not valid base64"))?;
        Self::from_bytes(bytes)
    }

    /// Reads the key from the environment. Absence is not fatal here: the
    /// caller gets `None` and every later cipher call fails fast instead.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(MASTER_KEY_ENV) {
            Ok(value) => Self::from_base64(&value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// Symmetric authenticated cipher over opaque byte strings.
///
/// Tenant-unaware and stateless apart from the injected key. An
/// unconfigured cipher (no key present at startup) constructs fine but
/// rejects every `encrypt`/`decrypt` with [`Error::Configuration`].
pub struct SecretCipher {
    key: Option<MasterKey>,
}

impl SecretCipher {
    pub fn new(key: MasterKey) -> Self {
        Self { key: Some(key) }
    }

    /// A cipher without key material. Useful for deployments that have not
    /// provisioned secrets yet; any actual use fails fast.
    pub fn unconfigured() -> Self {
        Self { key: None }
    }

    /// Builds the cipher from [`MASTER_KEY_ENV`], logging a warning when
    /// the variable is absent.
    pub fn from_env() -> Result<Self> {
        match MasterKey::from_env()? {
            Some(key) => Ok(Self::new(key)),
            None => {
                warn!(
                    env = MASTER_KEY_ENV,
                    "master key not set; credential encryption is unavailable"
                );
                Ok(Self::unconfigured())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    fn key_bytes(&self) -> Result<&[u8]> {
        match &self.key {
            Some(key) => Ok(key.bytes.expose_secret()),
            None => Err(Error::configuration(format!(
                "no master key configured; set {MASTER_KEY_ENV}"
            ))),
        }
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(self.key_bytes()?)
            .map_err(|_| Error::Crypto("invalid AES key".into()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Crypto("failed to encrypt payload".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts bytes produced by [`SecretCipher::encrypt`]. Any tampering
    /// or wrong-key condition surfaces as [`Error::Integrity`], never as
    /// corrupted plaintext.
    pub fn decrypt(&self, data: &[u8]) -> Result<SecretBytes> {
        let key = self.key_bytes()?;
        if data.len() < NONCE_LEN {
            return Err(Error::Integrity);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);

        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| Error::Crypto("invalid AES key".into()))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Integrity)?;
        Ok(SecretBytes::new(plaintext))
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("configured", &self.is_configured())
            .finish()
    }
}
