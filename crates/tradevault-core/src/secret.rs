//! Guarded plaintext wrappers.
//!
//! Decrypted credential material only ever travels inside these types:
//! non-`Clone`, redacted `Debug`, zeroized on drop. The borrow checker
//! keeps exposed slices from outliving the guard, so plaintext cannot
//! escape the scope it was decrypted for.

use secrecy::{ExposeSecret, SecretString, SecretVec};

use crate::error::{Error, Result};

/// Decrypted bytes, zeroized on drop.
pub struct SecretBytes {
    inner: SecretVec<u8>,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: SecretVec::new(bytes),
        }
    }

    /// Borrows the plaintext. The borrow cannot outlive the guard.
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Converts into a UTF-8 secret string, for credentials that are text.
    ///
    /// Validates in place before copying, so a rejected payload never
    /// leaves an unzeroized copy behind; the one copy made on success is
    /// owned by the returned secret and zeroized with it.
    pub fn into_secret_string(self) -> Result<SecretString> {
        let text = std::str::from_utf8(self.inner.expose_secret())
            .map_err(|_| Error::Crypto("decrypted payload is not valid UTF-8".into()))?
            .to_owned();
        Ok(SecretString::new(text))
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBytes([REDACTED])")
    }
}

/// One decrypted credential pair, alive only for the duration of a
/// scoped access.
///
/// Handed to the callback of `with_credential`; dropped (and zeroized)
/// when that callback's future completes or is cancelled. Not `Clone`, so
/// the callback cannot stash a copy on a long-lived object.
pub struct CredentialGuard {
    api_key: SecretString,
    api_secret: SecretString,
}

impl CredentialGuard {
    pub fn new(api_key: SecretString, api_secret: SecretString) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// The decrypted API key. Borrowed; cannot outlive the guard.
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// The decrypted API secret. Borrowed; cannot outlive the guard.
    pub fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }
}

impl std::fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialGuard { api_key: [REDACTED], api_secret: [REDACTED] }")
    }
}
