//! The credential store: pool ownership, tenant-stamped units of work,
//! and the shared denial path.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::context::set_tenant_context;
use crate::{rolecheck, schema};
use tradevault_core::audit::{Audit, AuditAction, AuditSink, DenialEvent};
use tradevault_core::{Error, Result, SecretCipher, TenantId};

/// Encrypted credential storage with database-enforced tenant isolation.
///
/// Every operation runs inside a transaction stamped with the caller's
/// tenant id before any table is touched; the row-level policies installed
/// by [`schema::migrate`] then filter every read and write. The cipher is
/// injected once at construction and immutable afterwards.
pub struct CredentialStore {
    pool: PgPool,
    cipher: Arc<SecretCipher>,
    audit: Audit,
    acquire_attempts: usize,
    acquire_backoff: Duration,
}

impl CredentialStore {
    /// Connects, migrates the schema, and verifies that the connecting
    /// role cannot bypass row level security. The role check is not
    /// optional: with a bypassing role every isolation policy is a
    /// silent no-op.
    pub async fn connect(config: &StoreConfig, cipher: SecretCipher) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(storage)?;

        schema::migrate(&pool).await?;
        rolecheck::verify_role_isolation(&pool).await?;

        let mut store = Self::with_pool(pool, cipher);
        store.acquire_attempts = config.acquire_attempts.max(1);
        store.acquire_backoff = config.acquire_backoff;
        Ok(store)
    }

    /// Wraps an existing pool. Schema migration and the role check are
    /// the caller's responsibility on this path.
    pub fn with_pool(pool: PgPool, cipher: SecretCipher) -> Self {
        Self {
            pool,
            cipher: Arc::new(cipher),
            audit: Audit::default(),
            acquire_attempts: 3,
            acquire_backoff: Duration::from_millis(200),
        }
    }

    /// Replaces the default tracing audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Audit::new(sink);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Audit records lost to sink failures since construction.
    pub fn audit_dropped(&self) -> u64 {
        self.audit.dropped()
    }

    pub(crate) fn cipher(&self) -> &SecretCipher {
        &self.cipher
    }

    /// Opens a transaction stamped with `tenant`. Pool exhaustion is the
    /// only failure retried, with bounded backoff; pooled connections are
    /// never trusted to carry a clean context, so the stamp is applied on
    /// every acquisition.
    pub(crate) async fn begin_for(&self, tenant: &TenantId) -> Result<Transaction<'static, Postgres>> {
        let mut attempt = 0usize;
        let mut tx = loop {
            attempt += 1;
            match self.pool.begin().await {
                Ok(tx) => break tx,
                Err(sqlx::Error::PoolTimedOut) if attempt < self.acquire_attempts => {
                    debug!(attempt, "connection pool exhausted, retrying");
                    tokio::time::sleep(self.acquire_backoff * attempt as u32).await;
                }
                Err(err) => return Err(storage(err)),
            }
        };
        set_tenant_context(&mut tx, tenant).await?;
        Ok(tx)
    }

    /// Emits one audit record and returns the uniform denial error. The
    /// error names the resource id only; whether the row exists for some
    /// other tenant is not recoverable from it.
    pub(crate) fn deny(
        &self,
        tenant: &TenantId,
        resource_id: Uuid,
        entity: &'static str,
        action: AuditAction,
        why: &'static str,
    ) -> Error {
        self.audit.denial(DenialEvent {
            tenant_id: tenant.to_string(),
            resource_id: resource_id.to_string(),
            action,
            reason: why,
        });
        Error::access_denied(format!("{entity} {resource_id}"))
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("cipher", &self.cipher)
            .field("audit", &self.audit)
            .finish()
    }
}

/// Maps driver failures into the storage variant, keeping the core error
/// surface free of driver types.
pub(crate) fn storage(err: sqlx::Error) -> Error {
    Error::storage(err.to_string())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}
