//! `medisync-core` — shared building blocks for the warehouse backend.
//!
//! Pure domain primitives: identifiers and the domain error model.

pub mod error;
pub mod id;

pub use error::DomainError;
pub use id::UserId;
