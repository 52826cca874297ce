//! Typed row mappings.
//!
//! Each table has an explicit row struct; encryption and decryption
//! happen only at this boundary, so nothing above the store ever sees
//! ciphertext. The summary row deliberately omits the ciphertext columns
//! so listings cannot select them by accident.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use tradevault_core::{Account, CredentialKind, CredentialSummary, Error, Result, TenantId};

#[derive(Debug, FromRow)]
pub(crate) struct AccountRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub label: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRow {
    pub(crate) fn into_account(self) -> Result<Account> {
        let tenant_id = TenantId::new(self.tenant_id)
            .map_err(|_| Error::storage("stored tenant id is malformed"))?;
        Ok(Account {
            id: self.id,
            tenant_id,
            label: self.label,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Only what the scoped accessor needs; no `Debug` derive, so the
/// ciphertext cannot wander into logs through a stray `{:?}`.
#[derive(FromRow)]
pub(crate) struct CredentialRow {
    pub api_key_ciphertext: Vec<u8>,
    pub api_secret_ciphertext: Vec<u8>,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub(crate) struct CredentialSummaryRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialSummaryRow {
    pub(crate) fn into_summary(self) -> Result<CredentialSummary> {
        let kind = CredentialKind::new(self.kind)
            .map_err(|_| Error::storage("stored credential kind is malformed"))?;
        Ok(CredentialSummary {
            id: self.id,
            account_id: self.account_id,
            kind,
            active: self.active,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
