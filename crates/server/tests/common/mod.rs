//! Shared fixtures: an in-memory database with the real schema and seed data, and a test
//! server over the full application router.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use base64::Engine;
use identity_provider::{
    AppResources,
    api::build_router,
    config::{AppConfig, ConnectionStrings, OAuth2Config, SeedConfig},
    email::{EmailError, EmailSender, OutgoingEmail},
    seed,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

pub const CLIENT_ID: &str = "blazorOIDC";
pub const REDIRECT_URI: &str = "https://localhost:5000/authentication/login-callback";
pub const POST_LOGOUT_REDIRECT_URI: &str = "https://localhost:5000/authentication/logout-callback";
pub const ALLOWED_ORIGIN: &str = "https://localhost:5000";
pub const SEED_PASSWORD: &str = "P@ssword1";

/// RFC 7636 appendix B.
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingEmailSender {
    pub fn last(&self) -> Option<OutgoingEmail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        connection_strings: ConnectionStrings {
            user_db_context_connection: "sqlite::memory:".into(),
        },
        issuer_url: "https://localhost:5001".into(),
        listen_addr: "127.0.0.1:0".into(),
        oauth2: OAuth2Config::default(),
        seed: SeedConfig::default(),
        smtp: None,
    }
}

/// Migrated and seeded in-memory database.
pub async fn seeded_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    seed::run(&db).await.expect("seed");
    db
}

pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<RecordingEmailSender>,
}

pub async fn test_app() -> TestApp {
    test_app_with_db(seeded_db().await).await
}

pub async fn test_app_with_db(db: DatabaseConnection) -> TestApp {
    let db = Arc::new(db);
    let mailer = Arc::new(RecordingEmailSender::default());
    let resources = AppResources {
        db: db.clone(),
        mailer: mailer.clone(),
        config: Arc::new(test_config()),
    };
    let router = build_router(resources).await;
    let server = TestServer::new(router).expect("create test server");
    TestApp { server, db, mailer }
}

pub fn s256(verifier: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Authorization request parameters for the seeded client.
pub fn authorize_params(scope: &str, challenge: &str) -> Vec<(&'static str, String)> {
    vec![
        ("response_type", "code".to_string()),
        ("client_id", CLIENT_ID.to_string()),
        ("redirect_uri", REDIRECT_URI.to_string()),
        ("scope", scope.to_string()),
        ("state", "xyz".to_string()),
        ("code_challenge", challenge.to_string()),
        ("code_challenge_method", "S256".to_string()),
    ]
}

pub fn location(response: &axum_test::TestResponse) -> url::Url {
    let location = response.header("location");
    let location = location.to_str().expect("location header");
    url::Url::parse(location)
        .or_else(|_| url::Url::parse("https://localhost:5001").and_then(|base| base.join(location)))
        .expect("parse location")
}

pub fn query_param(url: &url::Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Sign in through the login form and return the authorization code.
pub async fn login_for_code(server: &TestServer, login: &str, scope: &str, challenge: &str) -> String {
    let mut form = authorize_params(scope, challenge);
    form.push(("login", login.to_string()));
    form.push(("password", SEED_PASSWORD.to_string()));

    let response = server.post("/oauth2/login").form(&form).await;
    response.assert_status_see_other();
    let url = location(&response);
    assert!(url.as_str().starts_with(REDIRECT_URI), "unexpected redirect {url}");
    assert_eq!(query_param(&url, "state").as_deref(), Some("xyz"));
    query_param(&url, "code").expect("code in redirect")
}

pub async fn redeem(server: &TestServer, code: &str, verifier: &str) -> axum_test::TestResponse {
    server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("code_verifier", verifier),
        ])
        .await
}

/// Full code flow for a seed user, returning the access token.
pub async fn access_token(server: &TestServer, scope: &str) -> String {
    let code = login_for_code(server, "Jack", scope, CHALLENGE).await;
    let response = redeem(server, &code, VERIFIER).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["access_token"].as_str().expect("access_token").to_string()
}
