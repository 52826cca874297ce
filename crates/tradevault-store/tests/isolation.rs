//! Live-database tests for the isolation guarantees.
//!
//! These run only when `TRADEVAULT_TEST_DATABASE_URL` is set; each test
//! skips quietly otherwise. The configured role must be an ordinary one:
//! no SUPERUSER, no BYPASSRLS — `CredentialStore::connect` refuses
//! anything else, because a bypassing role makes every policy a no-op and
//! every test below would be testing nothing.
//!
//! Tenants are freshly generated per test, so runs do not interfere with
//! each other or with leftover rows from earlier runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use secrecy::SecretString;
use sqlx::Row;
use uuid::Uuid;

use tradevault_core::audit::{AuditAction, MemoryAuditSink};
use tradevault_core::{CredentialKind, CredentialUpdate, MasterKey, SecretCipher, TenantId};
use tradevault_store::{verify_role_isolation, CredentialStore, StoreConfig};

const TEST_DB_ENV: &str = "TRADEVAULT_TEST_DATABASE_URL";

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

async fn connect_store() -> Option<CredentialStore> {
    init_tracing();
    let url = match std::env::var(TEST_DB_ENV) {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping: {TEST_DB_ENV} not set");
            return None;
        }
    };
    let cipher = SecretCipher::new(MasterKey::from_bytes(vec![42u8; 32]).expect("32-byte key"));
    let store = CredentialStore::connect(&StoreConfig::new(url), cipher)
        .await
        .expect("connect (role must not hold SUPERUSER or BYPASSRLS)");
    Some(store)
}

fn fresh_tenant(prefix: &str) -> TenantId {
    TenantId::new(format!("{prefix}-{}", Uuid::new_v4().simple())).expect("tenant id")
}

fn secret(value: &str) -> SecretString {
    SecretString::new(value.into())
}

/// A tenant stores a credential pair and gets exactly the same plaintext
/// back inside the scoped access.
#[tokio::test]
async fn stored_credential_round_trips_through_scoped_access() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    let (key, secret_value) = store
        .with_credential(&alice, credential.id, |guard| async move {
            (guard.api_key().to_string(), guard.api_secret().to_string())
        })
        .await
        .expect("scoped access");

    assert_eq!(key, "PK123");
    assert_eq!(secret_value, "sk-abc");
}

/// Another tenant addressing the same credential id is denied, the
/// callback never runs, and exactly one audit record lands.
#[tokio::test]
async fn cross_tenant_access_is_denied_and_audited() {
    let Some(store) = connect_store().await else { return };
    let sink = Arc::new(MemoryAuditSink::new());
    let store = store.with_audit_sink(sink.clone());

    let alice = fresh_tenant("alice");
    let bob = fresh_tenant("bob");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let err = store
        .with_credential(&bob, credential.id, |_guard| async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .expect_err("cross-tenant access must be denied");

    assert_eq!(err.code(), "access_denied");
    assert!(!invoked.load(Ordering::SeqCst), "callback must never run");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tenant_id, bob.as_str());
    assert_eq!(events[0].resource_id, credential.id.to_string());
    assert_eq!(events[0].action, AuditAction::Read);
    assert_eq!(events[0].reason, "not_found_or_not_owned");
    assert_eq!(store.audit_dropped(), 0);
}

/// A connection that never had its tenant context stamped sees zero rows,
/// for any tenant's data: fail closed, never fail open.
#[tokio::test]
async fn unstamped_connection_sees_no_rows() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    for table in ["accounts", "credentials"] {
        let row = sqlx::query(&format!("SELECT count(*) AS n FROM {table}"))
            .fetch_one(store.pool())
            .await
            .expect("count");
        let count: i64 = row.get("n");
        assert_eq!(count, 0, "{table} must be invisible without tenant context");
    }
}

/// The automated half of the policy-bypass invariant: the configured role
/// must not be able to skip row security. Connect already enforces this;
/// the standalone check is what CI pins.
#[tokio::test]
async fn configured_role_cannot_bypass_row_security() {
    let Some(store) = connect_store().await else { return };
    verify_role_isolation(store.pool())
        .await
        .expect("role must not hold SUPERUSER or BYPASSRLS");
}

/// Listings are tenant-scoped and carry metadata only.
#[tokio::test]
async fn listings_are_scoped_and_metadata_only() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");
    let bob = fresh_tenant("bob");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    let listed = store.list_credentials(&alice).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].kind, CredentialKind::brokerage_paper());

    let json = serde_json::to_value(&listed[0]).expect("serialize");
    let object = json.as_object().expect("object");
    for field in object.keys() {
        assert!(
            !field.contains("key") && !field.contains("secret") && !field.contains("cipher"),
            "listing leaked field {field}"
        );
    }
    assert!(!json.to_string().contains("PK123"));

    assert!(store.list_credentials(&bob).await.expect("list").is_empty());
    assert!(store.list_accounts(&bob).await.expect("list").is_empty());
}

/// One credential per (account, kind): the second insert conflicts.
#[tokio::test]
async fn duplicate_kind_on_one_account_conflicts() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("first credential");

    let err = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK456"),
            secret("sk-def"),
        )
        .await
        .expect_err("duplicate kind must conflict");
    assert_eq!(err.code(), "conflict");
}

/// Deleting an account removes its credentials; nothing dangling survives.
#[tokio::test]
async fn account_delete_cascades_to_credentials() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    store
        .delete_account(&alice, account.id)
        .await
        .expect("delete account");

    assert!(store.list_credentials(&alice).await.expect("list").is_empty());
    let err = store
        .with_credential(&alice, credential.id, |_guard| async {})
        .await
        .expect_err("cascaded credential must be gone");
    assert_eq!(err.code(), "access_denied");
}

/// Updates re-encrypt supplied material and leave the rest untouched.
#[tokio::test]
async fn partial_update_re_encrypts_only_supplied_fields() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_live(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    store
        .update_credential(
            &alice,
            credential.id,
            CredentialUpdate {
                api_key: Some(secret("PK999")),
                ..Default::default()
            },
        )
        .await
        .expect("update");

    let (key, secret_value) = store
        .with_credential(&alice, credential.id, |guard| async move {
            (guard.api_key().to_string(), guard.api_secret().to_string())
        })
        .await
        .expect("scoped access");
    assert_eq!(key, "PK999");
    assert_eq!(secret_value, "sk-abc");
}

/// Deactivated credentials are denied with their own audited reason.
#[tokio::test]
async fn inactive_credential_is_denied() {
    let Some(store) = connect_store().await else { return };
    let sink = Arc::new(MemoryAuditSink::new());
    let store = store.with_audit_sink(sink.clone());
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    store
        .update_credential(
            &alice,
            credential.id,
            CredentialUpdate {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("deactivate");

    let err = store
        .with_credential(&alice, credential.id, |_guard| async {})
        .await
        .expect_err("inactive credential must be denied");
    assert_eq!(err.code(), "access_denied");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "inactive");
}

/// A past expiry denies access with its own audited reason, without ever
/// invoking the callback; clearing the expiry restores access.
#[tokio::test]
async fn expired_credential_is_denied_until_expiry_cleared() {
    let Some(store) = connect_store().await else { return };
    let sink = Arc::new(MemoryAuditSink::new());
    let store = store.with_audit_sink(sink.clone());
    let alice = fresh_tenant("alice");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    store
        .update_credential(
            &alice,
            credential.id,
            CredentialUpdate {
                expires_at: Some(Some(Utc::now() - Duration::minutes(5))),
                ..Default::default()
            },
        )
        .await
        .expect("set past expiry");

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let err = store
        .with_credential(&alice, credential.id, |_guard| async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .expect_err("expired credential must be denied");
    assert_eq!(err.code(), "access_denied");
    assert!(!invoked.load(Ordering::SeqCst), "callback must never run");

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "expired");
    assert_eq!(events[0].resource_id, credential.id.to_string());

    store
        .update_credential(
            &alice,
            credential.id,
            CredentialUpdate {
                expires_at: Some(None),
                ..Default::default()
            },
        )
        .await
        .expect("clear expiry");

    let key = store
        .with_credential(&alice, credential.id, |guard| async move {
            guard.api_key().to_string()
        })
        .await
        .expect("access restored once expiry is cleared");
    assert_eq!(key, "PK123");
}

/// Label lookup is a pure metadata path: tenant scoping is the query
/// predicate itself, so a miss is a plain not-found rather than the
/// uniform denial used where cross-tenant ambiguity exists.
#[tokio::test]
async fn find_account_returns_own_row_or_plain_not_found() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");
    let bob = fresh_tenant("bob");

    let created = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");

    let found = store
        .find_account(&alice, "default")
        .await
        .expect("own label must resolve");
    assert_eq!(found.id, created.id);
    assert_eq!(found.tenant_id, alice);

    let missing = store
        .find_account(&alice, "no-such-label")
        .await
        .expect_err("missing label");
    assert_eq!(missing.code(), "not_found");

    // Another tenant's label space is independent; alice's row is simply
    // not there for bob.
    let foreign = store
        .find_account(&bob, "default")
        .await
        .expect_err("foreign label space");
    assert_eq!(foreign.code(), "not_found");
}

/// Get-or-create converges on one row per (tenant, label).
#[tokio::test]
async fn get_or_create_account_is_idempotent() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");

    let first = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("first");
    let second = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("second");
    assert_eq!(first.id, second.id);
}

/// Deletion misses are uniform: a foreign credential and a repeat delete
/// both come back as the same denial.
#[tokio::test]
async fn delete_misses_are_indistinguishable() {
    let Some(store) = connect_store().await else { return };
    let alice = fresh_tenant("alice");
    let bob = fresh_tenant("bob");

    let account = store
        .get_or_create_account(&alice, "default")
        .await
        .expect("account");
    let credential = store
        .create_credential(
            &alice,
            account.id,
            &CredentialKind::brokerage_paper(),
            secret("PK123"),
            secret("sk-abc"),
        )
        .await
        .expect("credential");

    let foreign = store
        .delete_credential(&bob, credential.id)
        .await
        .expect_err("foreign delete must be denied");
    assert_eq!(foreign.code(), "access_denied");

    store
        .delete_credential(&alice, credential.id)
        .await
        .expect("owner delete");
    let repeat = store
        .delete_credential(&alice, credential.id)
        .await
        .expect_err("repeat delete looks like any other miss");
    assert_eq!(repeat.code(), "access_denied");
}
