//! OAuth2 / OpenID Connect authorization server.
//!
//! ## Supported Flows
//!
//! - Authorization Code with PKCE (public clients, no secret)
//! - Refresh Token (clients allowed offline access)
//!
//! ## Endpoints
//!
//! - `GET /oauth2/authorize` - Authorization endpoint
//! - `GET|POST /oauth2/login` - Interactive login
//! - `GET|POST /oauth2/consent` - Consent screen
//! - `GET|POST /oauth2/register`, `GET /oauth2/verify-email` - Self-registration
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/revoke` - Token revocation
//! - `GET /oauth2/userinfo` - OpenID Connect UserInfo
//! - `GET /oauth2/logout` - End session
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use utoipa_axum::router::OpenApiRouter;

pub mod bearer;
pub mod consent;
pub mod endpoints;
pub mod login;
pub mod logout;
pub mod password;
pub mod pkce;
pub mod register;
pub mod request;
pub mod state;

pub use password::{hash_password, verify_password};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

/// All routes under `/oauth2`.
pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .merge(endpoints::router())
        .merge(login::router())
        .merge(consent::router())
        .merge(register::router())
        .merge(logout::router())
}

/// Scope information for display on the login and consent pages.
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub name: String,
    pub description: String,
}

impl ScopeInfo {
    pub fn for_scope(scope: &str) -> Self {
        Self {
            name: scope.to_string(),
            description: crate::catalog::scope_display_name(scope),
        }
    }

    pub fn list(scope: &str) -> Vec<Self> {
        scope.split_whitespace().map(Self::for_scope).collect()
    }
}

#[derive(Template)]
#[template(path = "message.html")]
struct MessageTemplate<'a> {
    title: &'a str,
    message: &'a str,
}

/// Render an HTML page, or a plain 500 when the template fails.
fn render_page(template: &impl Template, name: &str) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(template = name, "Failed to render template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// A simple page with a heading and one line of text.
fn message_page(status: StatusCode, title: &str, message: &str) -> Response {
    let mut response = render_page(&MessageTemplate { title, message }, "message.html");
    if response.status() == StatusCode::OK {
        *response.status_mut() = status;
    }
    response
}
