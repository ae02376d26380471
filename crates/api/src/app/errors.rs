use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use medisync_auth::{KeyStoreError, TokenError, UserStoreError};

/// The single response for every authentication and authorization failure.
///
/// Carries no cause; the cause is logged where the failure happened.
pub fn unauthenticated() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({ "error": "unauthenticated" })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn user_store_error_to_response(err: UserStoreError) -> axum::response::Response {
    match err {
        UserStoreError::NotFound(id) => json_error(StatusCode::NOT_FOUND, "not_found", format!("user {id} not found")),
        UserStoreError::Invalid(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        UserStoreError::Duplicate(email) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("email '{email}' is already registered"),
        ),
        UserStoreError::Unavailable(msg) => {
            tracing::error!(error = %msg, "user store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "user store unavailable")
        }
    }
}

/// Issuance failures are server-side problems; the caller was already verified.
pub fn token_error_to_response(err: TokenError) -> axum::response::Response {
    tracing::error!(error = %err, "token issuance failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "token_error", "could not issue token")
}

pub fn key_store_error_to_response(err: KeyStoreError) -> axum::response::Response {
    match err {
        KeyStoreError::NoActiveKey(kid) => json_error(
            StatusCode::BAD_REQUEST,
            "unknown_kid",
            format!("kid '{kid}' is not registered"),
        ),
        other => {
            tracing::warn!(error = %other, "key reload failed");
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "key_material", other.to_string())
        }
    }
}
