//! `medisync-auth` — claims-based authentication/authorization core.
//!
//! This crate is intentionally decoupled from HTTP. It owns the signing key
//! registry, the token codec, the authorization rules and the user store
//! contract the authorization stage loads subjects from.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod keystore;
pub mod roles;
pub mod token;
pub mod user;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use authorize::{AuthorizationEngine, AuthorizationExplanation, AuthorizationRequest, Rule};
pub use claims::{Claims, validate_claims};
pub use error::{AuthzError, KeyStoreError, TokenError};
pub use keystore::{DirKeySource, KeyEntry, KeyPair, KeySource, KeyStore, MemoryKeySource, PublicKeyInfo};
pub use roles::Role;
pub use token::TokenCodec;
pub use user::{InMemoryUserStore, NewUser, User, UserStore, UserStoreError};
