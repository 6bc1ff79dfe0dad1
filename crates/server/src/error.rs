use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// JSON body of every OAuth2 error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Protocol errors raised by the authorization server and the protected API.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Unknown client. `at_token_endpoint` selects 401 over 400.
    #[error("invalid_client: {description}")]
    InvalidClient {
        description: String,
        at_token_endpoint: bool,
    },
    #[error("invalid_redirect_uri: {0}")]
    InvalidRedirectUri(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),
    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),
    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),
    #[error("invalid_token: {0}")]
    InvalidToken(String),
    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),
    #[error("server_error: {0}")]
    ServerError(#[from] DbErr),
    #[error("server_error: failed to generate token: {0}")]
    TokenGeneration(#[from] getrandom::Error),
}

impl OAuthError {
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::InvalidClient {
            description: description.into(),
            at_token_endpoint: false,
        }
    }

    pub fn invalid_client_at_token(description: impl Into<String>) -> Self {
        Self::InvalidClient {
            description: description.into(),
            at_token_endpoint: true,
        }
    }

    /// The OAuth2 `error` code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidRedirectUri(_) => "invalid_redirect_uri",
            Self::InvalidScope(_) => "invalid_scope",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::ServerError(_) | Self::TokenGeneration(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidClient {
                at_token_endpoint: true,
                ..
            }
            | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::ServerError(_) | Self::TokenGeneration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Human-readable description; database details are never exposed.
    pub fn description(&self) -> Option<String> {
        match self {
            Self::InvalidClient { description, .. } => Some(description.clone()),
            Self::InvalidRedirectUri(d)
            | Self::InvalidScope(d)
            | Self::InvalidGrant(d)
            | Self::InvalidRequest(d)
            | Self::UnauthorizedClient(d)
            | Self::UnsupportedGrantType(d)
            | Self::UnsupportedResponseType(d)
            | Self::InvalidToken(d)
            | Self::InsufficientScope(d) => (!d.is_empty()).then(|| d.clone()),
            Self::ServerError(_) | Self::TokenGeneration(_) => None,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        match &self {
            Self::ServerError(e) => {
                tracing::error!(error = %e, "Database error while handling OAuth2 request")
            }
            Self::TokenGeneration(e) => {
                tracing::error!(error = %e, "Failed to generate random token")
            }
            _ => {}
        }
        let status = self.status();
        let body = ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED
            && let Self::InvalidToken(_) = self
        {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }
        response
    }
}

/// Failures while seeding the user store or the client catalog.
///
/// An already existing record is not an error.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(#[from] DbErr),
    #[error("Failed to create user: {0}")]
    UserCreation(String),
}
