//! Protected forecast API, CORS and miscellaneous endpoints.

mod common;

use axum::http::{HeaderValue, Method, header};
use common::*;
use identity_provider::entity::oauth2_token;
use oidc_shared::WeatherForecast;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let response = app.server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn test_api_docs_served() {
    let app = test_app().await;
    app.server.get("/api-docs").await.assert_status_ok();
}

#[tokio::test]
async fn test_forecast_without_token_is_unauthorized() {
    let app = test_app().await;

    let response = app.server.get("/WeatherForecast").await;
    response.assert_status_unauthorized();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_forecast_with_unknown_token_is_unauthorized() {
    let app = test_app().await;

    let response = app
        .server
        .get("/WeatherForecast")
        .authorization_bearer("made-up-token")
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_forecast_with_expired_token_is_unauthorized() {
    let app = test_app().await;
    let now = OffsetDateTime::now_utc();

    oauth2_token::ActiveModel {
        id: Set("expired".into()),
        access_token: Set("expired-access-token".into()),
        refresh_token: Set(None),
        token_type: Set("Bearer".into()),
        client_id: Set(CLIENT_ID.into()),
        user_id: Set("someone".into()),
        scope: Set("openid blazorOIDCApi".into()),
        audience: Set("blazorOIDCApi".into()),
        access_token_expires_at: Set(now - Duration::minutes(1)),
        refresh_token_expires_at: Set(None),
        created_at: Set(now - Duration::hours(2)),
        revoked_at: Set(None),
    }
    .insert(app.db.as_ref())
    .await
    .unwrap();

    let response = app
        .server
        .get("/WeatherForecast")
        .authorization_bearer("expired-access-token")
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_forecast_without_api_scope_is_forbidden() {
    let app = test_app().await;
    let token = access_token(&app.server, "openid profile").await;

    let response = app
        .server
        .get("/WeatherForecast")
        .authorization_bearer(&token)
        .await;
    response.assert_status_forbidden();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "insufficient_scope");
}

#[tokio::test]
async fn test_forecast_with_api_scope_returns_five_days() {
    let app = test_app().await;
    let token = access_token(&app.server, "openid blazorOIDCApi").await;

    let response = app
        .server
        .get("/WeatherForecast")
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();

    let raw: serde_json::Value = response.json();
    assert!(raw[0].get("temperatureC").is_some());

    let forecasts: Vec<WeatherForecast> = response.json();
    assert_eq!(forecasts.len(), 5);
    let today = OffsetDateTime::now_utc().date();
    assert!(forecasts[0].date > today);
    for pair in forecasts.windows(2) {
        assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
    }
}

#[tokio::test]
async fn test_forecast_accepts_lowercase_scheme() {
    let app = test_app().await;
    let token = access_token(&app.server, "openid blazorOIDCApi").await;

    app.server
        .get("/WeatherForecast")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("bEaReR {token}")).unwrap(),
        )
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_cors_allows_registered_origin() {
    let app = test_app().await;

    let response = app
        .server
        .method(Method::OPTIONS, "/WeatherForecast")
        .add_header(header::ORIGIN, HeaderValue::from_static(ALLOWED_ORIGIN))
        .add_header(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("GET"),
        )
        .add_header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("authorization"),
        )
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        ALLOWED_ORIGIN
    );
}

#[tokio::test]
async fn test_cors_ignores_unregistered_origin() {
    let app = test_app().await;

    let response = app
        .server
        .get("/healthz")
        .add_header(
            header::ORIGIN,
            HeaderValue::from_static("https://evil.example.com"),
        )
        .await;

    response.assert_status_ok();
    assert!(
        response
            .maybe_header(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}
