//! Authenticate and authorize stages.
//!
//! Every failure in here, whatever its cause, becomes the same 401 response.
//! The cause is only logged.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use medisync_auth::{AuthorizationRequest, Rule, TokenError, User, UserStoreError};
use medisync_core::UserId;

use crate::app::{AppState, errors};
use crate::context::IdentityContext;

/// Upper bound for the subject lookup within one request.
pub const STAGE_TIMEOUT: Duration = Duration::from_secs(1);

/// State of an authorize stage: the app plus the rule this route is wired with.
#[derive(Clone)]
pub struct RouteGuard {
    state: AppState,
    rule: Rule,
}

impl RouteGuard {
    pub fn new(state: AppState, rule: Rule) -> Self {
        Self { state, rule }
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }
}

#[tracing::instrument(name = "authenticate", skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(err) => {
            tracing::debug!(error = %err, "missing or malformed credentials");
            return errors::unauthenticated();
        }
    };

    // Verification only touches the in-memory key registry; no time bound needed.
    let claims = match state.codec.verify(token, Utc::now()) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(error = %err, "token rejected");
            return errors::unauthenticated();
        }
    };

    tracing::debug!(user_id = %claims.sub, "caller authenticated");
    req.extensions_mut().insert(IdentityContext::new(claims));
    next.run(req).await
}

/// Evaluate the route's rule without a subject.
#[tracing::instrument(name = "authorize", skip_all, fields(rule = %guard.rule()))]
pub async fn authorize(State(guard): State<RouteGuard>, req: Request, next: Next) -> Response {
    let Some(identity) = req.extensions().get::<IdentityContext>() else {
        tracing::warn!("authorize stage reached without an identity");
        return errors::unauthenticated();
    };

    let request = AuthorizationRequest::without_subject(identity.claims().clone());
    if let Err(err) = guard.state.engine.evaluate(guard.rule, &request) {
        tracing::warn!(user_id = %identity.user_id(), error = %err, "request denied");
        return errors::unauthenticated();
    }

    next.run(req).await
}

/// Evaluate the route's rule against the user named by the `user_id` path
/// parameter, when the route has one.
///
/// An unparsable id, a missing user, a store error or a slow store all deny.
#[tracing::instrument(name = "authorize_user", skip_all, fields(rule = %guard.rule()))]
pub async fn authorize_user(
    State(guard): State<RouteGuard>,
    params: Option<Path<HashMap<String, String>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(identity) = req.extensions_mut().remove::<IdentityContext>() else {
        tracing::warn!("authorize stage reached without an identity");
        return errors::unauthenticated();
    };

    let raw_id = params.and_then(|Path(mut params)| params.remove("user_id"));
    let identity = match raw_id {
        None => identity,
        Some(raw) => match load_subject(&guard.state, &raw).await {
            Ok(user) => identity.with_subject(user),
            Err(reason) => {
                tracing::warn!(user_id = %identity.user_id(), requested = %raw, %reason, "request denied");
                return errors::unauthenticated();
            }
        },
    };

    let request = AuthorizationRequest::new(identity.claims().clone(), identity.subject().map(|user| user.id));
    if let Err(err) = guard.state.engine.evaluate(guard.rule, &request) {
        tracing::warn!(user_id = %identity.user_id(), error = %err, "request denied");
        return errors::unauthenticated();
    }

    req.extensions_mut().insert(identity);
    next.run(req).await
}

async fn load_subject(state: &AppState, raw: &str) -> Result<User, String> {
    let id: UserId = raw.parse().map_err(|e| format!("{e}"))?;

    match tokio::time::timeout(STAGE_TIMEOUT, state.users.query_by_id(id)).await {
        Ok(Ok(user)) => Ok(user),
        Ok(Err(UserStoreError::NotFound(id))) => Err(format!("user {id} not found")),
        Ok(Err(err)) => Err(format!("querybyid: user_id[{id}]: {err}")),
        Err(_) => Err(format!("querybyid: user_id[{id}]: timed out")),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, TokenError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| TokenError::Malformed("missing authorization header".to_string()))?;

    let header = header
        .to_str()
        .map_err(|_| TokenError::Malformed("authorization header is not ascii".to_string()))?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| TokenError::Malformed("expected authorization header format: Bearer <token>".to_string()))?;

    let token = header.trim();
    if token.is_empty() {
        return Err(TokenError::Malformed("empty bearer token".to_string()));
    }

    Ok(token)
}
