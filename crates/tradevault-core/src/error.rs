use thiserror::Error;

/// Result alias for vault operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Canonical error surface for the credential vault.
///
/// Every variant maps to a stable machine-readable code via [`Error::code`];
/// collaborators dispatch on the code, not on display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Missing or invalid startup configuration (master key, database role,
    /// connection string). Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Ciphertext failed authentication: tampered data or wrong key.
    /// Never retried; retrying cannot fix it.
    #[error("ciphertext integrity check failed")]
    Integrity,
    /// Cipher primitive failure outside of authentication (invalid key
    /// length, nonce generation).
    #[error("crypto error: {0}")]
    Crypto(String),
    /// The requested row is not visible under the current tenant context.
    /// Deliberately covers both "does not exist" and "owned by another
    /// tenant" so error codes never leak cross-tenant existence.
    #[error("access denied for {resource}")]
    AccessDenied { resource: String },
    /// A uniqueness invariant was violated on create.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Used only where tenant scoping is already the query predicate and
    /// no ambiguity with another tenant's data is possible.
    #[error("{entity} not found")]
    NotFound { entity: String },
    /// A caller-supplied field failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    /// Database or pool failure, carried as text so this crate stays free
    /// of driver dependencies.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stable code for machine dispatch.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Integrity => "integrity",
            Error::Crypto(_) => "crypto",
            Error::AccessDenied { .. } => "access_denied",
            Error::Conflict(_) => "conflict",
            Error::NotFound { .. } => "not_found",
            Error::Invalid { .. } => "invalid",
            Error::Storage(_) => "storage",
        }
    }

    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Error::Configuration(message.into())
    }

    pub fn access_denied<T: Into<String>>(resource: T) -> Self {
        Error::AccessDenied {
            resource: resource.into(),
        }
    }

    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Error::Conflict(message.into())
    }

    pub fn not_found<T: Into<String>>(entity: T) -> Self {
        Error::NotFound {
            entity: entity.into(),
        }
    }

    pub fn storage<T: Into<String>>(message: T) -> Self {
        Error::Storage(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::configuration("x").code(), "configuration");
        assert_eq!(Error::Integrity.code(), "integrity");
        assert_eq!(Error::access_denied("credential 1").code(), "access_denied");
        assert_eq!(Error::conflict("dup").code(), "conflict");
        assert_eq!(Error::not_found("account").code(), "not_found");
        assert_eq!(Error::storage("pool").code(), "storage");
    }

    #[test]
    fn access_denied_display_names_only_the_resource() {
        let err = Error::access_denied("credential 42");
        assert_eq!(err.to_string(), "access denied for credential 42");
    }
}
