//! Tenant, account, and credential domain types.
//!
//! These are the only shapes that cross the store boundary. Credential
//! metadata deliberately has no field that could carry ciphertext or
//! plaintext, so bulk listings cannot leak secret material by accident.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Validate an identifier component: non-empty, bounded, a leading
/// alphanumeric, and only supported characters after that.
///
/// The leading-alphanumeric rule keeps caller-supplied identifiers
/// disjoint from internal sentinels such as the `__none__` value the
/// isolation policy falls back to when no tenant context is set.
pub fn validate_component(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Invalid {
            field,
            reason: "must not be empty".into(),
        });
    }
    if value.len() > 128 {
        return Err(Error::Invalid {
            field,
            reason: "must be at most 128 characters".into(),
        });
    }
    let mut chars = value.chars();
    let first = chars.next().unwrap_or_default();
    if !first.is_ascii_alphanumeric() {
        return Err(Error::Invalid {
            field,
            reason: "must start with an ASCII letter or digit".into(),
        });
    }
    if !chars.all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '@')) {
        return Err(Error::Invalid {
            field,
            reason: "contains unsupported characters".into(),
        });
    }
    Ok(())
}

/// Opaque, stable identifier of one authenticated principal.
///
/// Supplied by the authentication collaborator from verified session
/// state, never derived from request payloads. This crate trusts the
/// identity and enforces only ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new<T: Into<String>>(value: T) -> Result<Self> {
        let value = value.into();
        validate_component(&value, "tenant id")?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// Tag classifying a credential within an account, e.g. `brokerage-paper`
/// or `brokerage-live`. At most one credential per `(account, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialKind(String);

impl CredentialKind {
    pub fn new<T: Into<String>>(value: T) -> Result<Self> {
        let value = value.into();
        validate_component(&value, "credential kind")?;
        if value.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(Error::Invalid {
                field: "credential kind",
                reason: "must be lowercase".into(),
            });
        }
        Ok(Self(value))
    }

    /// Paper-trading brokerage keys.
    pub fn brokerage_paper() -> Self {
        Self("brokerage-paper".into())
    }

    /// Live-trading brokerage keys.
    pub fn brokerage_live() -> Self {
        Self("brokerage-live".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A logical grouping of credentials owned by exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub label: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential metadata as returned from listings.
///
/// There is intentionally no ciphertext or plaintext field here; the
/// decrypted values are reachable only through the scoped accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: CredentialKind,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a stored credential. `None` leaves a field
/// untouched; new key or secret material is re-encrypted before persist.
#[derive(Default)]
pub struct CredentialUpdate {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub active: Option<bool>,
    /// `Some(None)` clears the expiry, `Some(Some(t))` sets it.
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl CredentialUpdate {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.api_secret.is_none()
            && self.active.is_none()
            && self.expires_at.is_none()
    }
}

impl fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("active", &self.active)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
