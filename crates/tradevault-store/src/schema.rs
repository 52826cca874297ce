//! Schema migration and the row-level isolation policies.
//!
//! Both tenant-owned tables carry an indexed `tenant_id` column, and four
//! policies each (select/insert/update/delete) keyed off the transaction
//! scoped marker set by [`crate::context::set_tenant_context`]. The
//! `tradevault_current_tenant()` helper coalesces an unset marker to the
//! `__none__` sentinel, which no real tenant id can equal (identifiers
//! must start with an alphanumeric), so a connection without context sees
//! zero rows: fail closed, never fail open.
//!
//! Row level security is both ENABLEd and FORCEd so the table owner gets
//! no exemption. Whether the *connecting role* can bypass policies
//! entirely is a separate runtime check, see [`crate::rolecheck`].

use sqlx::PgPool;
use tracing::info;

use crate::store::storage;
use tradevault_core::Result;

/// Applies the schema. Idempotent; safe to run at every startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await.map_err(storage)?;
    }
    info!("tradevault schema migrated");
    Ok(())
}

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        label TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (tenant_id, label)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credentials (
        id UUID PRIMARY KEY,
        account_id UUID NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        tenant_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        api_key_ciphertext BYTEA NOT NULL,
        api_secret_ciphertext BYTEA NOT NULL,
        active BOOLEAN NOT NULL DEFAULT true,
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (account_id, kind)
    )
    "#,
    // The policy filter column must be indexed; an unindexed policy
    // column turns every query into a full-table scan.
    "CREATE INDEX IF NOT EXISTS idx_accounts_tenant_id ON accounts(tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_credentials_tenant_id ON credentials(tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_credentials_account_id ON credentials(account_id)",
    r#"
    CREATE OR REPLACE FUNCTION tradevault_current_tenant() RETURNS TEXT AS $$
        SELECT COALESCE(
            NULLIF(current_setting('tradevault.tenant_id', true), ''),
            '__none__'
        )
    $$ LANGUAGE sql STABLE
    "#,
    "ALTER TABLE accounts ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE accounts FORCE ROW LEVEL SECURITY",
    "ALTER TABLE credentials ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE credentials FORCE ROW LEVEL SECURITY",
    "DROP POLICY IF EXISTS accounts_tenant_select ON accounts",
    r#"
    CREATE POLICY accounts_tenant_select ON accounts FOR SELECT
        USING (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS accounts_tenant_insert ON accounts",
    r#"
    CREATE POLICY accounts_tenant_insert ON accounts FOR INSERT
        WITH CHECK (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS accounts_tenant_update ON accounts",
    r#"
    CREATE POLICY accounts_tenant_update ON accounts FOR UPDATE
        USING (tenant_id = tradevault_current_tenant())
        WITH CHECK (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS accounts_tenant_delete ON accounts",
    r#"
    CREATE POLICY accounts_tenant_delete ON accounts FOR DELETE
        USING (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS credentials_tenant_select ON credentials",
    r#"
    CREATE POLICY credentials_tenant_select ON credentials FOR SELECT
        USING (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS credentials_tenant_insert ON credentials",
    r#"
    CREATE POLICY credentials_tenant_insert ON credentials FOR INSERT
        WITH CHECK (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS credentials_tenant_update ON credentials",
    r#"
    CREATE POLICY credentials_tenant_update ON credentials FOR UPDATE
        USING (tenant_id = tradevault_current_tenant())
        WITH CHECK (tenant_id = tradevault_current_tenant())
    "#,
    "DROP POLICY IF EXISTS credentials_tenant_delete ON credentials",
    r#"
    CREATE POLICY credentials_tenant_delete ON credentials FOR DELETE
        USING (tenant_id = tradevault_current_tenant())
    "#,
];
