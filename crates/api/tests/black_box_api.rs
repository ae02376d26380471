use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use medisync_api::app::{AppState, build_app};
use medisync_auth::{
    Claims, DirKeySource, InMemoryUserStore, KeySource, NewUser, Role, TokenCodec, User, UserStore, testutil,
};
use medisync_core::UserId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    codec: Arc<TokenCodec>,
    users: Arc<InMemoryUserStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_source(Arc::new(testutil::fixture_source()), "alpha").await
    }

    async fn spawn_with_source(key_source: Arc<dyn KeySource>, active_kid: &str) -> Self {
        let keys = Arc::new(medisync_auth::KeyStore::load(key_source.as_ref(), active_kid).unwrap());
        let codec = Arc::new(TokenCodec::new(keys, testutil::ISSUER, ChronoDuration::hours(1)));
        let users = Arc::new(InMemoryUserStore::new());

        // Build app (same router as prod), but bind to an ephemeral port.
        let app = build_app(AppState::new(codec.clone(), users.clone(), key_source));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            codec,
            users,
            handle,
        }
    }

    async fn add_user(&self, email: &str, roles: Vec<Role>) -> User {
        self.users
            .create(
                NewUser {
                    email: email.to_string(),
                    display_name: "Test User".to_string(),
                    roles,
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    fn token_for(&self, user: &User) -> String {
        self.codec.mint(user.id, user.roles.iter().copied(), Utc::now()).unwrap().0
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn assert_unauthenticated(res: reqwest::Response) {
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "unauthenticated" }));
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_or_bad_credentials_get_the_uniform_401() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/v1/auth/authenticate")).send().await.unwrap();
    assert_unauthenticated(res).await;

    let res = client
        .get(srv.url("/v1/auth/authenticate"))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;

    let res = client
        .get(srv.url("/v1/auth/authenticate"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;
}

#[tokio::test]
async fn authenticate_echoes_verified_claims() {
    let srv = TestServer::spawn().await;
    let user = srv.add_user("user@example.com", vec![Role::User]).await;

    let res = reqwest::Client::new()
        .get(srv.url("/v1/auth/authenticate"))
        .bearer_auth(srv.token_for(&user))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], user.id.to_string());
    assert_eq!(body["claims"]["roles"], json!(["USER"]));
    assert_eq!(body["claims"]["iss"], testutil::ISSUER);
}

#[tokio::test]
async fn expired_and_foreign_issuer_tokens_are_rejected() {
    let srv = TestServer::spawn().await;
    let user = srv.add_user("user@example.com", vec![Role::User]).await;
    let client = reqwest::Client::new();

    let stale = Claims::new(
        user.id,
        [Role::User],
        testutil::ISSUER,
        Utc::now() - ChronoDuration::hours(2),
        ChronoDuration::hours(1),
    )
    .unwrap();
    let res = client
        .get(srv.url("/v1/auth/authenticate"))
        .bearer_auth(srv.codec.issue(&stale).unwrap())
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;

    let foreign = Claims::new(user.id, [Role::User], "someone-else", Utc::now(), ChronoDuration::hours(1)).unwrap();
    let res = client
        .get(srv.url("/v1/auth/authenticate"))
        .bearer_auth(srv.codec.issue(&foreign).unwrap())
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;
}

#[tokio::test]
async fn user_routes_follow_the_authorization_matrix() {
    let srv = TestServer::spawn().await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let u1 = srv.add_user("u1@example.com", vec![Role::User]).await;
    let u2 = srv.add_user("u2@example.com", vec![Role::User]).await;
    let client = reqwest::Client::new();

    let get = |caller: &User, target: &User| {
        client
            .get(srv.url(&format!("/v1/users/{}", target.id)))
            .bearer_auth(srv.token_for(caller))
            .send()
    };

    // Own record.
    let res = get(&u1, &u1).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["email"], "u1@example.com");

    // Someone else's record.
    assert_unauthenticated(get(&u1, &u2).await.unwrap()).await;

    // Admin on anyone.
    assert_eq!(get(&admin, &u2).await.unwrap().status(), StatusCode::OK);

    // Admin-only listing.
    let res = client
        .get(srv.url("/v1/users"))
        .bearer_auth(srv.token_for(&u1))
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;

    let res = client
        .get(srv.url("/v1/users"))
        .bearer_auth(srv.token_for(&admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Vec<serde_json::Value> = res.json().await.unwrap();
    assert_eq!(body.len(), 3);
}

#[tokio::test]
async fn unknown_or_unparsable_subject_denies() {
    let srv = TestServer::spawn().await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let client = reqwest::Client::new();

    for path in [format!("/v1/users/{}", UserId::new()), "/v1/users/not-a-uuid".to_string()] {
        let res = client
            .get(srv.url(&path))
            .bearer_auth(srv.token_for(&admin))
            .send()
            .await
            .unwrap();
        assert_unauthenticated(res).await;
    }
}

#[tokio::test]
async fn admin_creates_users_and_mints_their_tokens() {
    let srv = TestServer::spawn().await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/v1/users"))
        .bearer_auth(srv.token_for(&admin))
        .json(&json!({ "email": "New@Example.com", "display_name": "New User", "roles": ["USER"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    assert_eq!(created["email"], "new@example.com");
    let new_id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url("/v1/users"))
        .bearer_auth(srv.token_for(&admin))
        .json(&json!({ "email": "new@example.com", "display_name": "Again", "roles": ["USER"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .post(srv.url(&format!("/v1/users/{new_id}/token")))
        .bearer_auth(srv.token_for(&admin))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let minted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(minted["kid"], "alpha");

    let claims = srv.codec.verify(minted["token"].as_str().unwrap(), Utc::now()).unwrap();
    assert_eq!(claims.sub.to_string(), new_id);
    assert!(claims.has_role(Role::User));
    assert!(!claims.has_role(Role::Admin));
}

#[tokio::test]
async fn non_admin_cannot_mint_for_themselves() {
    let srv = TestServer::spawn().await;
    let u1 = srv.add_user("u1@example.com", vec![Role::User]).await;

    let res = reqwest::Client::new()
        .post(srv.url(&format!("/v1/users/{}/token", u1.id)))
        .bearer_auth(srv.token_for(&u1))
        .send()
        .await
        .unwrap();
    assert_unauthenticated(res).await;
}

#[tokio::test]
async fn token_refresh_rereads_roles_from_the_store() {
    let srv = TestServer::spawn().await;
    let user = srv.add_user("user@example.com", vec![Role::User]).await;

    // Token claims admin, but the stored user is not one.
    let (inflated, _) = srv.codec.mint(user.id, [Role::Admin, Role::User], Utc::now()).unwrap();

    let res = reqwest::Client::new()
        .post(srv.url("/v1/auth/token"))
        .bearer_auth(inflated)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();

    let claims = srv.codec.verify(body["token"].as_str().unwrap(), Utc::now()).unwrap();
    assert_eq!(claims.roles.iter().copied().collect::<Vec<_>>(), vec![Role::User]);
}

#[tokio::test]
async fn authorize_endpoint_checks_rules() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let me = UserId::new();
    let claims = Claims::new(me, [Role::User], testutil::ISSUER, Utc::now(), ChronoDuration::minutes(5)).unwrap();

    let check = |rule: &str, user_id: Option<UserId>| {
        client
            .post(srv.url("/v1/auth/authorize"))
            .json(&json!({ "claims": claims, "user_id": user_id, "rule": rule }))
            .send()
    };

    assert_eq!(check("admin_or_subject", Some(me)).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(check("user_only", None).await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_unauthenticated(check("admin_or_subject", Some(UserId::new())).await.unwrap()).await;
    assert_unauthenticated(check("admin_or_subject", None).await.unwrap()).await;
    assert_unauthenticated(check("admin_only", Some(me)).await.unwrap()).await;
    assert_eq!(check("rule_admin_only", None).await.unwrap().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn keys_reload_rotates_and_retires_kids() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.pem"), testutil::ALPHA_PEM).unwrap();
    let srv = TestServer::spawn_with_source(Arc::new(DirKeySource::new(dir.path())), "alpha").await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let client = reqwest::Client::new();

    let old_token = srv.token_for(&admin);

    std::fs::write(dir.path().join("bravo.pem"), testutil::BRAVO_PEM).unwrap();
    let res = client
        .post(srv.url("/v1/admin/keys/reload"))
        .bearer_auth(&old_token)
        .json(&json!({ "active_kid": "bravo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["active_kid"], "bravo");

    let res = client.get(srv.url("/v1/auth/keys")).send().await.unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let kids: Vec<&str> = body["keys"].as_array().unwrap().iter().map(|k| k["kid"].as_str().unwrap()).collect();
    assert_eq!(kids, vec!["alpha", "bravo"]);

    // Tokens under the previous kid still verify until it is removed.
    let new_token = srv.token_for(&admin);
    let res = client.get(srv.url("/v1/auth/authenticate")).bearer_auth(&old_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    std::fs::remove_file(dir.path().join("alpha.pem")).unwrap();
    let res = client
        .post(srv.url("/v1/admin/keys/reload"))
        .bearer_auth(&new_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/v1/auth/authenticate")).bearer_auth(&old_token).send().await.unwrap();
    assert_unauthenticated(res).await;
    let res = client.get(srv.url("/v1/auth/authenticate")).bearer_auth(&new_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_reload_keeps_the_registry() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.pem"), testutil::ALPHA_PEM).unwrap();
    let srv = TestServer::spawn_with_source(Arc::new(DirKeySource::new(dir.path())), "alpha").await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let token = srv.token_for(&admin);

    std::fs::write(dir.path().join("broken.pem"), "not a key").unwrap();
    let res = reqwest::Client::new()
        .post(srv.url("/v1/admin/keys/reload"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(srv.codec.keys().kids(), vec!["alpha".to_string()]);
    assert!(srv.codec.verify(&token, Utc::now()).is_ok());
}

#[tokio::test]
async fn reload_naming_an_unknown_kid_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("alpha.pem"), testutil::ALPHA_PEM).unwrap();
    let srv = TestServer::spawn_with_source(Arc::new(DirKeySource::new(dir.path())), "alpha").await;
    let admin = srv.add_user("admin@example.com", vec![Role::Admin]).await;
    let token = srv.token_for(&admin);

    // New material parses fine, but the requested kid is not in it.
    std::fs::write(dir.path().join("bravo.pem"), testutil::BRAVO_PEM).unwrap();
    let res = reqwest::Client::new()
        .post(srv.url("/v1/admin/keys/reload"))
        .bearer_auth(&token)
        .json(&json!({ "active_kid": "zulu" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unknown_kid");

    assert_eq!(srv.codec.keys().kids(), vec!["alpha".to_string()]);
    assert_eq!(srv.codec.keys().active_kid(), "alpha");
    assert!(srv.codec.keys().private_key_for_signing().is_ok());
}
