//! Error taxonomy of the auth core.
//!
//! Registry errors are fatal at startup and, at request time, only ever show
//! up wrapped inside a [`TokenError`]. Token and authorization errors are
//! always request-time and the HTTP layer collapses all of them into one
//! "unauthenticated" response.

use thiserror::Error;

use crate::authorize::Rule;

/// Failures of the signing key registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// An entry of the key source could not be parsed as a private key.
    #[error("malformed key material for kid '{kid}': {reason}")]
    KeyMaterial { kid: String, reason: String },

    /// The key source contained no entries.
    #[error("key source contains no keys")]
    EmptyRegistry,

    /// The configured active kid is not registered.
    #[error("active kid '{0}' is not registered")]
    NoActiveKey(String),

    /// A token names a kid the registry does not know.
    #[error("unknown kid '{0}'")]
    UnknownKey(String),

    /// The key source itself could not be read.
    #[error("key source unavailable: {0}")]
    Source(String),
}

/// Failures while issuing or verifying a token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token cannot be decomposed into header, claims and signature.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The token is well formed but cannot be checked against any key.
    #[error("invalid token: {0}")]
    InvalidToken(#[source] KeyStoreError),

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    /// `exp` is not strictly after `iat`.
    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    /// `iat + ttl` falls outside the representable time range (issuance only).
    #[error("token lifetime is out of range")]
    TtlOutOfRange,

    #[error("invalid issuer: expected '{expected}', got '{actual}'")]
    InvalidIssuer { expected: String, actual: String },

    /// No usable signing key (issuance only).
    #[error("no signing key: {0}")]
    NoSigningKey(#[source] KeyStoreError),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Authorization denial.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("permission denied by rule '{rule}': {reason}")]
    PermissionDenied { rule: Rule, reason: String },
}

impl AuthzError {
    pub fn denied(rule: Rule, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            rule,
            reason: reason.into(),
        }
    }
}
