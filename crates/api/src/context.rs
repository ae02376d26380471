use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;

use medisync_auth::{Claims, User};
use medisync_core::UserId;

use crate::app::errors;

/// Verified identity for one request.
///
/// Inserted by the authenticate stage, enriched with the loaded subject by
/// `authorize_user`, and handed to the handler as an extractor. Handlers that
/// take it never run for an unauthenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    user_id: UserId,
    claims: Claims,
    subject: Option<User>,
}

impl IdentityContext {
    pub fn new(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            claims,
            subject: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// The user named by the route's `user_id`, when the route loads one.
    pub fn subject(&self) -> Option<&User> {
        self.subject.as_ref()
    }

    pub fn with_subject(mut self, subject: User) -> Self {
        self.subject = Some(subject);
        self
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdentityContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .remove::<IdentityContext>()
            .ok_or_else(errors::unauthenticated)
    }
}
