//! CRUD over encrypted credential records.
//!
//! Every operation opens its own tenant-stamped transaction, so the
//! row-level policies apply even if a future code path forgets an
//! application-side check. The tenant id argument is never authoritative
//! on its own; it is the same id the context was stamped with and serves
//! as a cross-check where rows are re-read inside the transaction.

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::rows::{AccountRow, CredentialSummaryRow};
use crate::store::{is_unique_violation, storage, CredentialStore};
use tradevault_core::audit::{reason, AuditAction};
use tradevault_core::{
    Account, CredentialKind, CredentialSummary, CredentialUpdate, Error, Result, TenantId,
};

const ACCOUNT_COLUMNS: &str = "id, tenant_id, label, active, created_at, updated_at";
const SUMMARY_COLUMNS: &str = "id, account_id, kind, active, expires_at, created_at, updated_at";

fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(Error::Invalid {
            field: "account label",
            reason: "must not be empty".into(),
        });
    }
    if label.len() > 128 {
        return Err(Error::Invalid {
            field: "account label",
            reason: "must be at most 128 characters".into(),
        });
    }
    Ok(())
}

impl CredentialStore {
    /// Creates an account for `tenant`. Duplicate labels within a tenant
    /// surface as [`Error::Conflict`].
    pub async fn create_account(&self, tenant: &TenantId, label: &str) -> Result<Account> {
        validate_label(label)?;
        let mut tx = self.begin_for(tenant).await?;

        let row: AccountRow = sqlx::query_as(&format!(
            "INSERT INTO accounts (id, tenant_id, label) VALUES ($1, $2, $3) \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(tenant.as_str())
        .bind(label)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::conflict(format!("account label `{label}` already in use"))
            } else {
                storage(err)
            }
        })?;

        tx.commit().await.map_err(storage)?;
        row.into_account()
    }

    /// Returns the tenant's account with this label, creating it on first
    /// use. Concurrent first-use races collapse onto the existing row.
    pub async fn get_or_create_account(&self, tenant: &TenantId, label: &str) -> Result<Account> {
        validate_label(label)?;
        let mut tx = self.begin_for(tenant).await?;

        let existing: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE label = $1"
        ))
        .bind(label)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let row = match existing {
            Some(row) => row,
            None => sqlx::query_as(&format!(
                "INSERT INTO accounts (id, tenant_id, label) VALUES ($1, $2, $3) \
                 ON CONFLICT (tenant_id, label) \
                 DO UPDATE SET updated_at = accounts.updated_at \
                 RETURNING {ACCOUNT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(tenant.as_str())
            .bind(label)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?,
        };

        tx.commit().await.map_err(storage)?;
        row.into_account()
    }

    /// All accounts visible to `tenant`.
    pub async fn list_accounts(&self, tenant: &TenantId) -> Result<Vec<Account>> {
        let mut tx = self.begin_for(tenant).await?;
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    /// Looks up the tenant's own account by label. Tenant scoping is the
    /// query predicate itself here, so a miss is a plain
    /// [`Error::NotFound`]; no cross-tenant ambiguity is possible.
    pub async fn find_account(&self, tenant: &TenantId, label: &str) -> Result<Account> {
        let mut tx = self.begin_for(tenant).await?;
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE label = $1"
        ))
        .bind(label)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        row.ok_or_else(|| Error::not_found("account"))?.into_account()
    }

    /// Deletes an account and, by cascade, every credential under it. A
    /// row that is invisible under this tenant's context and a row that
    /// never existed are indistinguishable by design.
    pub async fn delete_account(&self, tenant: &TenantId, account_id: Uuid) -> Result<()> {
        let mut tx = self.begin_for(tenant).await?;
        let deleted: Option<(Uuid,)> =
            sqlx::query_as("DELETE FROM accounts WHERE id = $1 RETURNING id")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;

        if deleted.is_none() {
            return Err(self.deny(
                tenant,
                account_id,
                "account",
                AuditAction::Delete,
                reason::NOT_FOUND_OR_NOT_OWNED,
            ));
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    /// Stores one encrypted credential pair under an account.
    ///
    /// The account is re-read inside the same stamped transaction and its
    /// tenant id cross-checked before insert: defense in depth on top of
    /// the row policies. The denormalized `tenant_id` on the credential is
    /// copied from that account row, never from caller input. A second
    /// credential of the same kind on one account is a conflict.
    pub async fn create_credential(
        &self,
        tenant: &TenantId,
        account_id: Uuid,
        kind: &CredentialKind,
        api_key: SecretString,
        api_secret: SecretString,
    ) -> Result<CredentialSummary> {
        let mut tx = self.begin_for(tenant).await?;

        let account: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let account = match account {
            Some(account) => account,
            None => {
                return Err(self.deny(
                    tenant,
                    account_id,
                    "account",
                    AuditAction::Create,
                    reason::NOT_FOUND_OR_NOT_OWNED,
                ))
            }
        };
        if account.tenant_id != tenant.as_str() {
            // Unreachable while the policies hold; kept as the
            // application-side half of defense in depth.
            return Err(self.deny(
                tenant,
                account_id,
                "account",
                AuditAction::Create,
                reason::ACCOUNT_MISMATCH,
            ));
        }

        let key_ciphertext = self.cipher().encrypt(api_key.expose_secret().as_bytes())?;
        let secret_ciphertext = self.cipher().encrypt(api_secret.expose_secret().as_bytes())?;

        let row: CredentialSummaryRow = sqlx::query_as(&format!(
            "INSERT INTO credentials \
             (id, account_id, tenant_id, kind, api_key_ciphertext, api_secret_ciphertext) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {SUMMARY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(account.id)
        .bind(&account.tenant_id)
        .bind(kind.as_str())
        .bind(&key_ciphertext)
        .bind(&secret_ciphertext)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                Error::conflict(format!("credential kind `{kind}` already exists for account"))
            } else {
                storage(err)
            }
        })?;

        tx.commit().await.map_err(storage)?;
        row.into_summary()
    }

    /// Metadata for every credential visible to `tenant`. The ciphertext
    /// columns are not even selected; bulk listings cannot carry secret
    /// material.
    pub async fn list_credentials(&self, tenant: &TenantId) -> Result<Vec<CredentialSummary>> {
        let mut tx = self.begin_for(tenant).await?;
        let rows: Vec<CredentialSummaryRow> = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM credentials ORDER BY created_at"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;
        rows.into_iter()
            .map(CredentialSummaryRow::into_summary)
            .collect()
    }

    /// Applies a partial update. New key or secret material is
    /// re-encrypted; omitted fields keep their stored values.
    pub async fn update_credential(
        &self,
        tenant: &TenantId,
        credential_id: Uuid,
        update: CredentialUpdate,
    ) -> Result<CredentialSummary> {
        let mut tx = self.begin_for(tenant).await?;

        let current: Option<CredentialSummaryRow> = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM credentials WHERE id = $1 FOR UPDATE"
        ))
        .bind(credential_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let current = match current {
            Some(row) => row,
            None => {
                return Err(self.deny(
                    tenant,
                    credential_id,
                    "credential",
                    AuditAction::Update,
                    reason::NOT_FOUND_OR_NOT_OWNED,
                ))
            }
        };

        if update.is_empty() {
            tx.commit().await.map_err(storage)?;
            return current.into_summary();
        }

        let key_ciphertext = match &update.api_key {
            Some(value) => Some(self.cipher().encrypt(value.expose_secret().as_bytes())?),
            None => None,
        };
        let secret_ciphertext = match &update.api_secret {
            Some(value) => Some(self.cipher().encrypt(value.expose_secret().as_bytes())?),
            None => None,
        };
        let active = update.active.unwrap_or(current.active);
        let expires_at = match update.expires_at {
            Some(value) => value,
            None => current.expires_at,
        };

        let row: CredentialSummaryRow = sqlx::query_as(&format!(
            "UPDATE credentials SET \
             api_key_ciphertext = COALESCE($2, api_key_ciphertext), \
             api_secret_ciphertext = COALESCE($3, api_secret_ciphertext), \
             active = $4, expires_at = $5, updated_at = now() \
             WHERE id = $1 \
             RETURNING {SUMMARY_COLUMNS}"
        ))
        .bind(credential_id)
        .bind(&key_ciphertext)
        .bind(&secret_ciphertext)
        .bind(active)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        row.into_summary()
    }

    /// Deletes one credential. As with [`CredentialStore::delete_account`],
    /// "not found" and "not owned" are deliberately the same outcome.
    pub async fn delete_credential(&self, tenant: &TenantId, credential_id: Uuid) -> Result<()> {
        let mut tx = self.begin_for(tenant).await?;
        let deleted: Option<(Uuid,)> =
            sqlx::query_as("DELETE FROM credentials WHERE id = $1 RETURNING id")
                .bind(credential_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;

        if deleted.is_none() {
            return Err(self.deny(
                tenant,
                credential_id,
                "credential",
                AuditAction::Delete,
                reason::NOT_FOUND_OR_NOT_OWNED,
            ));
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}
