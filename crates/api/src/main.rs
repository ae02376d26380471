use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use medisync_api::{app, config::ApiConfig};
use medisync_auth::{DirKeySource, InMemoryUserStore, KeyStore, NewUser, Role, TokenCodec, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    medisync_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    let key_source = Arc::new(DirKeySource::new(config.keys_dir.clone()));
    let keys = KeyStore::load(key_source.as_ref(), config.active_kid.clone())
        .with_context(|| format!("loading signing keys from {}", config.keys_dir.display()))?;
    // Fail fast rather than on the first issuance.
    keys.private_key_for_signing().context("active signing key")?;

    let codec = Arc::new(TokenCodec::new(Arc::new(keys), config.issuer.clone(), config.token_ttl));
    let users = Arc::new(InMemoryUserStore::new());

    if let Some(email) = config.bootstrap_admin_email.clone() {
        let admin = users
            .create(
                NewUser {
                    email,
                    display_name: "Bootstrap Admin".to_string(),
                    roles: vec![Role::Admin, Role::User],
                },
                Utc::now(),
            )
            .await
            .context("creating bootstrap admin")?;
        let (token, claims) = codec.mint(admin.id, admin.roles.iter().copied(), Utc::now())?;
        tracing::info!(user_id = %admin.id, email = %admin.email, expires_at = %claims.expires_at, "bootstrap admin created");
        // Printed rather than logged so it never reaches the log pipeline.
        println!("{token}");
    }

    let state = app::AppState::new(codec, users, key_source);
    let app = app::build_app(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
