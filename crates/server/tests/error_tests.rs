use axum::http::StatusCode;
use axum::response::IntoResponse;
use identity_provider::error::{OAuthError, SeedError};
use sea_orm::DbErr;

#[test]
fn test_oauth_error_codes_and_status() {
    let cases = [
        (OAuthError::invalid_client("x"), "invalid_client", StatusCode::BAD_REQUEST),
        (
            OAuthError::invalid_client_at_token("x"),
            "invalid_client",
            StatusCode::UNAUTHORIZED,
        ),
        (
            OAuthError::InvalidRedirectUri("x".into()),
            "invalid_redirect_uri",
            StatusCode::BAD_REQUEST,
        ),
        (OAuthError::InvalidScope("x".into()), "invalid_scope", StatusCode::BAD_REQUEST),
        (OAuthError::InvalidGrant("x".into()), "invalid_grant", StatusCode::BAD_REQUEST),
        (OAuthError::InvalidRequest("x".into()), "invalid_request", StatusCode::BAD_REQUEST),
        (
            OAuthError::UnsupportedGrantType("x".into()),
            "unsupported_grant_type",
            StatusCode::BAD_REQUEST,
        ),
        (
            OAuthError::UnsupportedResponseType("x".into()),
            "unsupported_response_type",
            StatusCode::BAD_REQUEST,
        ),
        (OAuthError::InvalidToken("x".into()), "invalid_token", StatusCode::UNAUTHORIZED),
        (
            OAuthError::InsufficientScope("x".into()),
            "insufficient_scope",
            StatusCode::FORBIDDEN,
        ),
        (
            OAuthError::ServerError(DbErr::Custom("boom".into())),
            "server_error",
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (error, code, status) in cases {
        assert_eq!(error.code(), code);
        assert_eq!(error.status(), status, "status for {code}");
    }
}

#[test]
fn test_oauth_error_display() {
    let err = OAuthError::InvalidScope("Scope 'admin' is not allowed".into());
    assert_eq!(err.to_string(), "invalid_scope: Scope 'admin' is not allowed");
}

#[test]
fn test_server_error_hides_database_details() {
    let err = OAuthError::from(DbErr::Custom("connection refused to 10.0.0.5".into()));
    assert!(err.description().is_none());
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_invalid_token_sets_www_authenticate() {
    let response = OAuthError::InvalidToken("expired".into()).into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get("www-authenticate")
        .expect("challenge header")
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Bearer"));
    assert!(challenge.contains("invalid_token"));
}

#[test]
fn test_seed_error_from_db_error() {
    let err: SeedError = DbErr::Custom("unreachable".into()).into();
    assert!(matches!(err, SeedError::DatabaseUnavailable(_)));
    assert!(err.to_string().contains("unreachable"));

    let err = SeedError::UserCreation("Password too short".into());
    assert!(err.to_string().contains("Password too short"));
}
