//! Users: the subjects the authorization stage loads and compares against.
//!
//! Storage is behind [`UserStore`]; the in-memory implementation backs tests
//! and single-node dev deployments.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medisync_core::{DomainError, UserId};

use crate::Role;

/// A registered user.
///
/// # Invariants
/// - `email` is lowercase, trimmed and unique across the store.
/// - `roles` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: BTreeSet<Role>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl NewUser {
    /// Normalise and validate into a [`User`] with a fresh id.
    pub fn into_user(self, now: DateTime<Utc>) -> Result<User, DomainError> {
        let email = self.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        let display_name = self.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        let roles: BTreeSet<Role> = self.roles.into_iter().collect();
        if roles.is_empty() {
            return Err(DomainError::validation("at least one role is required"));
        }

        Ok(User {
            id: UserId::new(),
            email,
            display_name,
            roles,
            created_at: now,
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserStoreError {
    #[error("user {0} not found")]
    NotFound(UserId),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("email '{0}' is already registered")]
    Duplicate(String),

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup-by-id store the authorization stage resolves subjects from.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn query_by_id(&self, id: UserId) -> Result<User, UserStoreError>;

    async fn query_all(&self) -> Result<Vec<User>, UserStoreError>;

    async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, UserStoreError>;
}

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully built user (fixtures, bootstrap).
    pub fn insert(&self, user: User) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn query_by_id(&self, id: UserId) -> Result<User, UserStoreError> {
        let map = self.inner.read().map_err(|_| UserStoreError::Unavailable("lock poisoned".to_string()))?;
        map.get(&id).cloned().ok_or(UserStoreError::NotFound(id))
    }

    async fn query_all(&self) -> Result<Vec<User>, UserStoreError> {
        let map = self.inner.read().map_err(|_| UserStoreError::Unavailable("lock poisoned".to_string()))?;
        let mut users: Vec<User> = map.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn create(&self, new_user: NewUser, now: DateTime<Utc>) -> Result<User, UserStoreError> {
        let user = new_user.into_user(now)?;

        let mut map = self.inner.write().map_err(|_| UserStoreError::Unavailable("lock poisoned".to_string()))?;
        if map.values().any(|existing| existing.email == user.email) {
            return Err(UserStoreError::Duplicate(user.email));
        }
        map.insert(user.id, user.clone());

        tracing::info!(user_id = %user.id, roles = ?user.roles, "user created");
        Ok(user)
    }
}
