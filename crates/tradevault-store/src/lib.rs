//! PostgreSQL persistence for the TradeVault credential isolation layer.
//!
//! This crate provides:
//! - Pool and configuration management ([`StoreConfig`], [`CredentialStore`])
//! - Schema migration with forced row-level-security policies
//!   ([`schema::migrate`])
//! - The transaction-scoped tenant context
//!   ([`context::set_tenant_context`])
//! - The credential repository (CRUD over encrypted records) and the
//!   decrypt-on-demand scoped accessor
//!   ([`CredentialStore::with_credential`])
//! - The runtime policy-bypass role check
//!   ([`rolecheck::verify_role_isolation`])
//!
//! Domain types, cipher, and audit sink come from `tradevault-core`.

mod access;
pub mod config;
pub mod context;
mod repository;
pub mod rolecheck;
mod rows;
pub mod schema;
mod store;

pub use config::{StoreConfig, DATABASE_URL_ENV};
pub use context::set_tenant_context;
pub use rolecheck::verify_role_isolation;
pub use schema::migrate;
pub use store::CredentialStore;
