//! Operator routes for the signing key registry.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::app::{AppState, errors, routes::auth::KeysResponse};
use crate::context::IdentityContext;

#[derive(Debug, Default, Deserialize)]
pub struct ReloadKeysRequest {
    /// Make this kid active; it must be present in the reloaded key set.
    #[serde(default)]
    pub active_kid: Option<String>,
}

/// Re-read the key source and optionally rotate the active kid.
///
/// The new keys and active kid go live together. A failed reload, or an
/// `active_kid` missing from the new key set, leaves the previous registry in
/// place.
pub async fn reload_keys(
    State(state): State<AppState>,
    identity: IdentityContext,
    body: Option<Json<ReloadKeysRequest>>,
) -> Response {
    let request = body.map(|Json(body)| body).unwrap_or_default();
    let store = state.codec.keys();

    if let Err(err) = store.reload_with_active(state.key_source.as_ref(), request.active_kid.as_deref()) {
        return errors::key_store_error_to_response(err);
    }

    tracing::info!(by = %identity.user_id(), active_kid = %store.active_kid(), "key registry reloaded via api");
    Json(KeysResponse {
        active_kid: store.active_kid(),
        keys: store.public_keys(),
    })
    .into_response()
}
