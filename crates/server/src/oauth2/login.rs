//! Interactive login.
//!
//! The form carries the authorization request as hidden fields; the submission re-validates
//! it before authenticating the user and issuing a code.

use crate::entity::identity_user;
use crate::oauth2::request::{AuthorizationParams, validate_authorization_request};
use crate::oauth2::{ScopeInfo, render_page, state::OAuth2State, verify_password};
use askama::Template;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

const INVALID_CREDENTIALS: &str = "Invalid user name or password";

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    hidden: Vec<(&'static str, String)>,
    login: String,
    error: Option<String>,
    message: Option<String>,
    client_name: Option<String>,
    scopes: Vec<ScopeInfo>,
    register_url: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(flatten)]
    pub params: AuthorizationParams,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Form data for login submission.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(flatten)]
    pub params: AuthorizationParams,
    /// User name or email address
    pub login: String,
    pub password: String,
}

pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .routes(routes!(login_page))
        .routes(routes!(login_submit))
}

/// Hidden form fields that replay the authorization request.
pub(crate) fn hidden_fields(params: &AuthorizationParams) -> Vec<(&'static str, String)> {
    params
        .pairs()
        .into_iter()
        .filter(|(key, _)| *key != "login_hint")
        .map(|(key, value)| (key, value.to_string()))
        .collect()
}

/// Display the login page.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/login",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Login Page",
    summary = "Display the OAuth2 login page",
    description = "Renders the login form for the authorization flow. This endpoint is redirected to \
                   from `/authorize` and carries the authorization request parameters.",
    params(AuthorizationParams),
    responses(
        (status = 200, description = "Login page HTML"),
        (status = 500, description = "Internal server error"),
    )
)]
async fn login_page(State(state): State<OAuth2State>, Query(query): Query<LoginQuery>) -> Response {
    let client_name = crate::entity::oauth2_client::Entity::find_by_id(&query.params.client_id)
        .one(state.db.as_ref())
        .await
        .ok()
        .flatten()
        .map(|c| c.name);

    let scope = query.params.scope.as_deref().unwrap_or(crate::catalog::OPENID_SCOPE);
    let template = LoginTemplate {
        hidden: hidden_fields(&query.params),
        login: query.params.login_hint.clone().unwrap_or_default(),
        error: query.error,
        message: query.message,
        client_name,
        scopes: ScopeInfo::list(scope),
        register_url: query.params.page_url("/oauth2/register", &[]),
    };
    render_page(&template, "login.html")
}

/// Handle login form submission.
#[tracing::instrument(skip(state, form), fields(login = %form.login, client_id = %form.params.client_id))]
#[utoipa::path(
    post,
    path = "/login",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Login Submit",
    summary = "Submit OAuth2 login credentials",
    description = "Re-validates the authorization request, then authenticates the user by user name or \
                   email and password. The email address must be confirmed. On success either the consent \
                   screen is shown (clients requiring consent) or an authorization code is issued and the \
                   user is redirected to the client's redirect_uri.",
    request_body(
        content = LoginForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Login credentials and OAuth2 flow parameters"
    ),
    responses(
        (status = 303, description = "Redirect to client with authorization code, to consent, or back to login with error"),
        (status = 400, description = "The carried authorization request is invalid"),
    )
)]
async fn login_submit(State(state): State<OAuth2State>, Form(form): Form<LoginForm>) -> Response {
    let authorization = match validate_authorization_request(state.db.as_ref(), &form.params).await {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    let login = form.login.trim();
    if login.is_empty() || form.password.is_empty() {
        return redirect_to_login_with_error(&form, "Please enter your user name and password");
    }

    let user = match identity_user::Entity::find()
        .filter(
            Condition::any()
                .add(identity_user::Column::UserName.eq(login))
                .add(identity_user::Column::Email.eq(login.to_lowercase())),
        )
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => return redirect_to_login_with_error(&form, INVALID_CREDENTIALS),
        Err(e) => {
            tracing::error!("Database error looking up user: {}", e);
            return redirect_to_login_with_error(&form, "An error occurred. Please try again.");
        }
    };

    let password_ok = user
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(&form.password, hash));
    if !password_ok {
        tracing::info!("Rejected login attempt");
        return redirect_to_login_with_error(&form, INVALID_CREDENTIALS);
    }

    if !user.email_confirmed {
        return redirect_to_login_with_error(
            &form,
            "Please confirm your email address before signing in. Check your inbox for the confirmation link.",
        );
    }

    if let Err(e) = state.update_last_login(&user.id).await {
        tracing::warn!("Failed to update last_login_at: {}", e);
    }
    tracing::info!(user_id = %user.id, "User authenticated successfully");

    if authorization.client.require_consent {
        return match state.store_consent(&user, authorization).await {
            Ok(handle) => {
                let url = format!("/oauth2/consent?token={}", urlencoding::encode(&handle));
                Redirect::to(&url).into_response()
            }
            Err(e) => e.into_response(),
        };
    }

    match state.issue_authorization_code(&authorization, &user.id).await {
        Ok(code) => authorization.code_redirect(&code),
        Err(e) => e.into_response(),
    }
}

/// Redirect back to login page with an error message.
fn redirect_to_login_with_error(form: &LoginForm, error: &str) -> Response {
    let mut params = form.params.clone();
    if !form.login.is_empty() {
        params.login_hint = Some(form.login.clone());
    }
    Redirect::to(&params.page_url("/oauth2/login", &[("error", error)])).into_response()
}
