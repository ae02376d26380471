//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers, one file per area
//! - `errors.rs`: consistent error responses, including the uniform 401

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use medisync_auth::{AuthorizationEngine, KeySource, Rule, TokenCodec, UserStore};

use crate::middleware::{self, RouteGuard};

pub mod errors;
pub mod routes;

/// Collaborators shared by the middleware stages and handlers.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub engine: AuthorizationEngine,
    pub users: Arc<dyn UserStore>,
    /// Where `POST /v1/admin/keys/reload` re-reads key material from.
    pub key_source: Arc<dyn KeySource>,
}

impl AppState {
    pub fn new(codec: Arc<TokenCodec>, users: Arc<dyn UserStore>, key_source: Arc<dyn KeySource>) -> Self {
        Self {
            codec,
            engine: AuthorizationEngine::new(),
            users,
            key_source,
        }
    }

    fn guard(&self, rule: Rule) -> RouteGuard {
        RouteGuard::new(self.clone(), rule)
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(routes::system::health))
        .route("/v1/auth/keys", get(routes::auth::keys))
        .route("/v1/auth/authorize", post(routes::auth::authorize));

    let any_caller = Router::new()
        .route("/v1/auth/authenticate", get(routes::auth::authenticate))
        .route("/v1/auth/token", post(routes::auth::token))
        .route_layer(axum::middleware::from_fn_with_state(
            state.guard(Rule::Any),
            middleware::authorize,
        ));

    let admin = Router::new()
        .route("/v1/admin/keys/reload", post(routes::admin::reload_keys))
        .route("/v1/users", get(routes::users::list).post(routes::users::create))
        .route_layer(axum::middleware::from_fn_with_state(
            state.guard(Rule::AdminOnly),
            middleware::authorize,
        ));

    let subject = Router::new()
        .route("/v1/users/:user_id", get(routes::users::get_user))
        .route_layer(axum::middleware::from_fn_with_state(
            state.guard(Rule::AdminOrSubject),
            middleware::authorize_user,
        ));

    let subject_admin = Router::new()
        .route("/v1/users/:user_id/token", post(routes::users::mint_token))
        .route_layer(axum::middleware::from_fn_with_state(
            state.guard(Rule::AdminOnly),
            middleware::authorize_user,
        ));

    // Authenticate runs first for everything below; the per-route guards run after it.
    let protected = Router::new()
        .merge(any_caller)
        .merge(admin)
        .merge(subject)
        .merge(subject_admin)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(ServiceBuilder::new())
        .with_state(state)
}
