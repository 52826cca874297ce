//! Decrypt-on-demand scoped access.

use std::future::Future;

use chrono::Utc;
use secrecy::SecretString;
use tracing::error;
use uuid::Uuid;

use crate::rows::CredentialRow;
use crate::store::{storage, CredentialStore};
use tradevault_core::audit::{reason, AuditAction, AUDIT_TARGET};
use tradevault_core::{CredentialGuard, Error, Result, TenantId};

const CREDENTIAL_COLUMNS: &str =
    "api_key_ciphertext, api_secret_ciphertext, active, expires_at";

impl CredentialStore {
    /// Runs `f` with the decrypted credential, for the minimum possible
    /// lifetime.
    ///
    /// Acquires a connection, stamps the tenant context, fetches the row
    /// through the isolation policies, decrypts, and hands `f` a
    /// [`CredentialGuard`]. The guard is non-`Clone` and zeroizes on drop,
    /// so the plaintext dies with the callback's future on every exit
    /// path, including panic and cancellation. The database connection is
    /// returned to the pool before `f` runs; the caller's I/O never holds
    /// a pooled connection hostage.
    ///
    /// A row that is invisible under this tenant's context yields
    /// [`tradevault_core::Error::AccessDenied`] without invoking `f`, and
    /// emits exactly one audit record. The caller cannot distinguish
    /// "wrong tenant" from "does not exist"; that opacity is the point.
    pub async fn with_credential<F, Fut, R>(
        &self,
        tenant: &TenantId,
        credential_id: Uuid,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(CredentialGuard) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut tx = self.begin_for(tenant).await?;

        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = $1"
        ))
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let row = match row {
            Some(row) => row,
            None => {
                return Err(self.deny(
                    tenant,
                    credential_id,
                    "credential",
                    AuditAction::Read,
                    reason::NOT_FOUND_OR_NOT_OWNED,
                ))
            }
        };

        if !row.active {
            return Err(self.deny(
                tenant,
                credential_id,
                "credential",
                AuditAction::Read,
                reason::INACTIVE,
            ));
        }
        if let Some(expires_at) = row.expires_at {
            if expires_at <= Utc::now() {
                return Err(self.deny(
                    tenant,
                    credential_id,
                    "credential",
                    AuditAction::Read,
                    reason::EXPIRED,
                ));
            }
        }

        let api_key = self.decrypt_field(&row.api_key_ciphertext, tenant, credential_id)?;
        let api_secret = self.decrypt_field(&row.api_secret_ciphertext, tenant, credential_id)?;

        // Read-only unit of work; release the connection before handing
        // control to the caller.
        tx.commit().await.map_err(storage)?;

        Ok(f(CredentialGuard::new(api_key, api_secret)).await)
    }

    /// Decrypts one stored field. An authentication failure here means
    /// tampered ciphertext or a wrong key; it propagates as a hard
    /// failure and is logged as a security event (identifiers only).
    fn decrypt_field(
        &self,
        ciphertext: &[u8],
        tenant: &TenantId,
        credential_id: Uuid,
    ) -> Result<SecretString> {
        let plaintext = self
            .cipher()
            .decrypt(ciphertext)
            .and_then(|bytes| bytes.into_secret_string());
        if let Err(Error::Integrity) = &plaintext {
            error!(
                target: AUDIT_TARGET,
                tenant_id = %tenant,
                credential_id = %credential_id,
                "stored ciphertext failed authentication"
            );
        }
        plaintext
    }
}
