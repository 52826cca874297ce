//! Transaction-scoped tenant context.

use sqlx::{PgConnection, Postgres, Transaction};

use crate::store::storage;
use tradevault_core::{Result, TenantId};

/// Stamps the current transaction with the caller's tenant id.
///
/// Uses `set_config(..., is_local => true)`, which scopes the marker to
/// the enclosing transaction: it vanishes at commit or rollback, so a
/// pooled connection can never carry one tenant's context into another
/// tenant's reuse of it. Idempotent within a transaction; the isolation
/// policies read the marker through `tradevault_current_tenant()`.
pub async fn set_tenant_context(tx: &mut Transaction<'_, Postgres>, tenant: &TenantId) -> Result<()> {
    set_tenant_context_on(&mut **tx, tenant).await
}

/// Connection-level variant for callers managing their own transaction.
/// Outside a transaction the marker would be session-scoped, which is
/// exactly the leak this crate exists to prevent; only call this inside
/// an open transaction.
pub async fn set_tenant_context_on(conn: &mut PgConnection, tenant: &TenantId) -> Result<()> {
    sqlx::query("SELECT set_config('tradevault.tenant_id', $1, true)")
        .bind(tenant.as_str())
        .execute(conn)
        .await
        .map_err(storage)?;
    Ok(())
}
