//! Domain primitives for the TradeVault credential isolation layer.
//!
//! This crate provides:
//! - Tenant, account, and credential types ([`TenantId`], [`Account`],
//!   [`CredentialSummary`])
//! - Authenticated encryption of credential material ([`SecretCipher`])
//! - Guarded plaintext wrappers that cannot outlive their scope
//!   ([`CredentialGuard`], [`SecretBytes`])
//! - The access audit sink ([`AuditSink`], [`Audit`])
//! - The canonical error taxonomy ([`Error`])
//!
//! Persistence and row-level isolation live in `tradevault-store`.

pub mod audit;
pub mod cipher;
pub mod error;
pub mod secret;
pub mod types;

pub use audit::{Audit, AuditAction, AuditSink, DenialEvent, MemoryAuditSink, TracingAuditSink};
pub use cipher::{MasterKey, SecretCipher, MASTER_KEY_ENV};
pub use error::{Error, Result};
pub use secret::{CredentialGuard, SecretBytes};
pub use types::{
    Account, CredentialKind, CredentialSummary, CredentialUpdate, TenantId, validate_component,
};
