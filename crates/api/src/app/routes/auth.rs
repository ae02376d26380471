use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medisync_auth::{AuthorizationRequest, Claims, PublicKeyInfo, Rule, validate_claims};
use medisync_core::UserId;

use crate::app::{AppState, errors};
use crate::context::IdentityContext;

#[derive(Debug, Serialize)]
pub struct KeysResponse {
    pub active_kid: String,
    pub keys: Vec<PublicKeyInfo>,
}

pub async fn keys(State(state): State<AppState>) -> Json<KeysResponse> {
    let store = state.codec.keys();
    Json(KeysResponse {
        active_kid: store.active_kid(),
        keys: store.public_keys(),
    })
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub user_id: UserId,
    pub claims: Claims,
}

pub async fn authenticate(identity: IdentityContext) -> Json<AuthenticateResponse> {
    Json(AuthenticateResponse {
        user_id: identity.user_id(),
        claims: identity.claims().clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeBody {
    pub claims: Claims,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub rule: String,
}

/// Service-to-service check of already verified claims against a rule.
///
/// `204` on allow, the uniform 401 on deny. An unknown rule name is a client
/// error and never reaches evaluation.
pub async fn authorize(State(state): State<AppState>, Json(body): Json<AuthorizeBody>) -> Response {
    let rule: Rule = match body.rule.parse() {
        Ok(rule) => rule,
        Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_rule", msg),
    };

    if let Err(err) = validate_claims(&body.claims, Utc::now()) {
        tracing::warn!(user_id = %body.claims.sub, error = %err, "authorize check on stale claims");
        return errors::unauthenticated();
    }

    let request = AuthorizationRequest::new(body.claims, body.user_id);
    let explanation = state.engine.explain(rule, &request);
    if explanation.granted {
        tracing::debug!(?explanation, "authorize check granted");
        StatusCode::NO_CONTENT.into_response()
    } else {
        tracing::warn!(?explanation, "authorize check denied");
        errors::unauthenticated()
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub kid: String,
    pub expires_at: DateTime<Utc>,
}

/// Re-issue a token for the caller under the active key.
///
/// Roles come from the user store, not from the presented token, so role
/// changes take effect on the next refresh.
pub async fn token(State(state): State<AppState>, identity: IdentityContext) -> Response {
    let user = match state.users.query_by_id(identity.user_id()).await {
        Ok(user) => user,
        Err(err) => {
            tracing::warn!(user_id = %identity.user_id(), error = %err, "token refresh for unknown caller");
            return errors::unauthenticated();
        }
    };

    mint_for(&state, user.id, user.roles.iter().copied())
}

pub(crate) fn mint_for(
    state: &AppState,
    user_id: UserId,
    roles: impl IntoIterator<Item = medisync_auth::Role>,
) -> Response {
    match state.codec.mint(user_id, roles, Utc::now()) {
        Ok((token, claims)) => {
            let kid = state.codec.keys().active_kid();
            tracing::info!(%user_id, %kid, "token issued");
            Json(TokenResponse {
                token,
                kid,
                expires_at: claims.expires_at,
            })
            .into_response()
        }
        Err(err) => errors::token_error_to_response(err),
    }
}
