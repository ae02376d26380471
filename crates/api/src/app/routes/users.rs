use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use medisync_auth::{NewUser, User};

use crate::app::{AppState, errors, routes::auth::mint_for};
use crate::context::IdentityContext;

pub async fn list(State(state): State<AppState>) -> Response {
    match state.users.query_all().await {
        Ok(users) => Json(users).into_response(),
        Err(err) => errors::user_store_error_to_response(err),
    }
}

pub async fn create(
    State(state): State<AppState>,
    identity: IdentityContext,
    Json(body): Json<NewUser>,
) -> Response {
    match state.users.create(body, Utc::now()).await {
        Ok(user) => {
            tracing::info!(created_by = %identity.user_id(), user_id = %user.id, "user registered by admin");
            (StatusCode::CREATED, Json(user)).into_response()
        }
        Err(err) => errors::user_store_error_to_response(err),
    }
}

/// The subject was loaded and authorized by `authorize_user`; this only
/// renders it.
pub async fn get_user(identity: IdentityContext) -> Response {
    match identity.subject() {
        Some(user) => Json::<User>(user.clone()).into_response(),
        None => errors::unauthenticated(),
    }
}

/// Mint a token for the loaded subject (admin tooling).
pub async fn mint_token(State(state): State<AppState>, identity: IdentityContext) -> Response {
    let Some(user) = identity.subject() else {
        return errors::unauthenticated();
    };

    tracing::info!(minted_by = %identity.user_id(), subject = %user.id, "admin minting token");
    mint_for(&state, user.id, user.roles.iter().copied())
}
