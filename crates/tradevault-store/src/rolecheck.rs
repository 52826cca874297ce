//! Runtime verification that the connecting role cannot bypass row
//! level security.
//!
//! Managed PostgreSQL platforms commonly grant the schema-owning role
//! `BYPASSRLS` (or outright superuser) by default, which turns every
//! isolation policy into a silent no-op while policies, schema, and
//! isolated tests all look correct. This check runs on every connect and
//! is exported so CI can assert it independently.

use sqlx::{PgPool, Row};
use tracing::info;

use crate::store::storage;
use tradevault_core::{Error, Result};

/// Fails with [`Error::Configuration`] if the session role holds
/// `BYPASSRLS` or `SUPERUSER`.
pub async fn verify_role_isolation(pool: &PgPool) -> Result<()> {
    let row = sqlx::query(
        "SELECT rolname, rolsuper, rolbypassrls FROM pg_roles WHERE rolname = current_user",
    )
    .fetch_one(pool)
    .await
    .map_err(storage)?;

    let name: String = row.get("rolname");
    let superuser: bool = row.get("rolsuper");
    let bypass: bool = row.get("rolbypassrls");

    if bypass {
        return Err(Error::configuration(format!(
            "database role `{name}` holds BYPASSRLS; row level security would be silently skipped"
        )));
    }
    if superuser {
        return Err(Error::configuration(format!(
            "database role `{name}` is a superuser; row level security would be silently skipped"
        )));
    }

    info!(role = %name, "database role verified: no row-security bypass");
    Ok(())
}
