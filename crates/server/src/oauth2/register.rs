//! OAuth2 Registration endpoints.
//!
//! Implements user registration for the OAuth2 authorization flow:
//! - Registration page (GET)
//! - Registration submission (POST)
//! - Email confirmation (GET)
//!
//! Self-registered accounts use their email address as user name and cannot sign in until
//! the address is confirmed.

use crate::AppResources;
use crate::email::ConfirmEmailTemplate;
use crate::entity::{identity_user, identity_user_claim, oauth2_client};
use crate::oauth2::login::hidden_fields;
use crate::oauth2::password::{generate_token, validate_password_policy};
use crate::oauth2::request::AuthorizationParams;
use crate::oauth2::{hash_password, message_page, render_page, state::OAuth2State};
use askama::Template;
use axum::{
    Extension, Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

const CONFIRMATION_LIFETIME: Duration = Duration::hours(24);
const GENERIC_ERROR: &str = "An error occurred. Please try again.";

/// Registration page template.
#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    hidden: Vec<(&'static str, String)>,
    email: String,
    error: Option<String>,
    message: Option<String>,
    client_name: Option<String>,
    login_url: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    #[serde(flatten)]
    pub params: AuthorizationParams,
    pub email: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Form data for registration submission.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterForm {
    #[serde(flatten)]
    pub params: AuthorizationParams,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
    #[serde(flatten)]
    pub params: AuthorizationParams,
}

/// Creates the registration router.
pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .routes(routes!(register_page))
        .routes(routes!(register_submit))
        .routes(routes!(verify_email))
}

/// Display the registration page.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/register",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Register Page",
    summary = "Display the OAuth2 registration page",
    description = "Renders the registration form. Users register with email and password, then confirm \
                   their email before they can sign in.",
    params(AuthorizationParams),
    responses(
        (status = 200, description = "Registration page HTML"),
        (status = 500, description = "Internal server error"),
    )
)]
async fn register_page(
    State(state): State<OAuth2State>,
    Query(query): Query<RegisterQuery>,
) -> Response {
    let client_name = oauth2_client::Entity::find_by_id(&query.params.client_id)
        .one(state.db.as_ref())
        .await
        .ok()
        .flatten()
        .map(|c| c.name);

    let template = RegisterTemplate {
        hidden: hidden_fields(&query.params),
        email: query.email.unwrap_or_default(),
        error: query.error,
        message: query.message,
        client_name,
        login_url: query.params.page_url("/oauth2/login", &[]),
    };
    render_page(&template, "register.html")
}

/// Handle registration form submission.
#[tracing::instrument(skip(state, resources, form), fields(email = %form.email))]
#[utoipa::path(
    post,
    path = "/register",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Register Submit",
    summary = "Submit OAuth2 registration",
    description = "Creates a new account with email and password and sends a confirmation email. \
                   The password must have at least 8 characters. An unconfirmed account whose link \
                   expired is updated with the new password and receives a fresh link.",
    request_body(
        content = RegisterForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Registration data and OAuth2 flow parameters"
    ),
    responses(
        (status = 303, description = "Redirect back to registration page with success/error message"),
    )
)]
async fn register_submit(
    State(state): State<OAuth2State>,
    Extension(resources): Extension<AppResources>,
    Form(form): Form<RegisterForm>,
) -> Response {
    let email = form.email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') {
        return redirect_to_register(&form, "error", "Please enter a valid email address");
    }
    if let Err(e) = validate_password_policy(&form.password) {
        return redirect_to_register(&form, "error", &e.to_string());
    }
    if form.password != form.password_confirm {
        return redirect_to_register(&form, "error", "Passwords do not match");
    }

    let existing = match identity_user::Entity::find()
        .filter(
            Condition::any()
                .add(identity_user::Column::Email.eq(&email))
                .add(identity_user::Column::UserName.eq(&email)),
        )
        .one(state.db.as_ref())
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!("Database error checking existing user: {}", e);
            return redirect_to_register(&form, "error", GENERIC_ERROR);
        }
    };

    if let Some(user) = existing {
        if user.email_confirmed {
            return redirect_to_register(
                &form,
                "error",
                "An account with this email already exists. Please sign in instead.",
            );
        }
        if user.has_pending_confirmation()
            && let Some(token) = user.email_confirmation_token.as_deref()
        {
            return match send_confirmation_email(&resources, &user.user_name, &email, token, &form.params).await {
                Ok(()) => redirect_to_register(
                    &form,
                    "message",
                    "A confirmation email has already been sent. We've sent it again - please check your inbox.",
                ),
                Err(e) => {
                    tracing::error!("Failed to resend confirmation email: {}", e);
                    redirect_to_register(&form, "error", "Couldn't send confirmation email. Please try again.")
                }
            };
        }
        return update_and_resend(&state, &resources, &form, user).await;
    }

    let Ok(password_hash) = hash_password(&form.password) else {
        tracing::error!("Failed to hash password");
        return redirect_to_register(&form, "error", GENERIC_ERROR);
    };
    let token = match generate_token() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to generate confirmation token: {}", e);
            return redirect_to_register(&form, "error", GENERIC_ERROR);
        }
    };

    if let Err(e) = create_user(&state, &email, password_hash, &token).await {
        tracing::error!("Failed to create user: {}", e);
        return redirect_to_register(&form, "error", GENERIC_ERROR);
    }

    if let Err(e) = send_confirmation_email(&resources, &email, &email, &token, &form.params).await {
        tracing::error!("Failed to send confirmation email: {}", e);
        return redirect_to_register(
            &form,
            "message",
            "Account created but we couldn't send the confirmation email. Please try again later.",
        );
    }

    tracing::info!(email = %email, "User registered, confirmation email sent");
    redirect_to_register(
        &form,
        "message",
        "Account created! Please check your email for the confirmation link.",
    )
}

async fn create_user(
    state: &OAuth2State,
    email: &str,
    password_hash: String,
    token: &str,
) -> Result<(), sea_orm::DbErr> {
    let now = OffsetDateTime::now_utc();
    let user_id = uuid::Uuid::new_v4().to_string();
    let txn = state.db.begin().await?;

    identity_user::ActiveModel {
        id: Set(user_id.clone()),
        user_name: Set(email.to_string()),
        email: Set(email.to_string()),
        email_confirmed: Set(false),
        password_hash: Set(Some(password_hash)),
        email_confirmation_token: Set(Some(token.to_string())),
        email_confirmation_expires_at: Set(Some(now + CONFIRMATION_LIFETIME)),
        created_at: Set(now),
        last_login_at: Set(None),
    }
    .insert(&txn)
    .await?;

    identity_user_claim::ActiveModel {
        user_id: Set(user_id),
        claim_type: Set("email".to_string()),
        claim_value: Set(email.to_string()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await
}

/// Give an unconfirmed account whose link expired a new password and a fresh link.
async fn update_and_resend(
    state: &OAuth2State,
    resources: &AppResources,
    form: &RegisterForm,
    user: identity_user::Model,
) -> Response {
    let Ok(password_hash) = hash_password(&form.password) else {
        tracing::error!("Failed to hash password");
        return redirect_to_register(form, "error", GENERIC_ERROR);
    };
    let token = match generate_token() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to generate confirmation token: {}", e);
            return redirect_to_register(form, "error", GENERIC_ERROR);
        }
    };

    let user_name = user.user_name.clone();
    let email = user.email.clone();
    let mut active: identity_user::ActiveModel = user.into();
    active.password_hash = Set(Some(password_hash));
    active.email_confirmation_token = Set(Some(token.clone()));
    active.email_confirmation_expires_at =
        Set(Some(OffsetDateTime::now_utc() + CONFIRMATION_LIFETIME));

    if let Err(e) = active.update(state.db.as_ref()).await {
        tracing::error!("Failed to update user: {}", e);
        return redirect_to_register(form, "error", GENERIC_ERROR);
    }

    if let Err(e) = send_confirmation_email(resources, &user_name, &email, &token, &form.params).await {
        tracing::error!("Failed to send confirmation email: {}", e);
        return redirect_to_register(form, "error", "Couldn't send confirmation email. Please try again.");
    }

    redirect_to_register(
        form,
        "message",
        "Your account has been updated. Please check your email for the confirmation link.",
    )
}

/// Send the confirmation link; it carries the authorization request so the user can continue.
async fn send_confirmation_email(
    resources: &AppResources,
    user_name: &str,
    email: &str,
    token: &str,
    params: &AuthorizationParams,
) -> Result<(), crate::email::EmailError> {
    let path = params.page_url("/oauth2/verify-email", &[("token", token)]);
    let confirm_url = format!("{}{}", resources.config.issuer(), path);

    let message = ConfirmEmailTemplate {
        user_name: user_name.to_string(),
        confirm_url,
    }
    .into_email(email)?;
    resources.mailer.send(message).await
}

/// Handle email confirmation link.
#[tracing::instrument(skip(state, query))]
#[utoipa::path(
    get,
    path = "/verify-email",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Verify Email",
    summary = "Confirm email address from registration",
    description = "Handles the confirmation link sent during registration. On success, redirects to the \
                   login page so the user can sign in and continue the authorization flow.",
    params(
        ("token" = String, Query, description = "The email confirmation token."),
    ),
    responses(
        (status = 303, description = "Redirect to login page on success"),
        (status = 400, description = "Error page HTML on failure"),
    )
)]
async fn verify_email(
    State(state): State<OAuth2State>,
    Query(query): Query<VerifyEmailQuery>,
) -> Response {
    let user = match identity_user::Entity::find()
        .filter(identity_user::Column::EmailConfirmationToken.eq(&query.token))
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            return message_page(
                StatusCode::BAD_REQUEST,
                "Confirmation failed",
                "Invalid or expired confirmation link. Please register again.",
            );
        }
        Err(e) => {
            tracing::error!("Database error during confirmation: {}", e);
            return message_page(StatusCode::INTERNAL_SERVER_ERROR, "Confirmation failed", GENERIC_ERROR);
        }
    };

    if user.is_confirmation_expired() {
        return message_page(
            StatusCode::BAD_REQUEST,
            "Confirmation failed",
            "This confirmation link has expired. Please register again to get a new link.",
        );
    }

    let user_name = user.user_name.clone();
    let mut active: identity_user::ActiveModel = user.into();
    active.email_confirmed = Set(true);
    active.email_confirmation_token = Set(None);
    active.email_confirmation_expires_at = Set(None);

    if let Err(e) = active.update(state.db.as_ref()).await {
        tracing::error!("Failed to confirm user email: {}", e);
        return message_page(StatusCode::INTERNAL_SERVER_ERROR, "Confirmation failed", GENERIC_ERROR);
    }

    tracing::info!(user_name = %user_name, "User email confirmed");

    let mut params = query.params;
    params.login_hint = Some(user_name);
    let url = params.page_url(
        "/oauth2/login",
        &[("message", "Email confirmed. You can now sign in.")],
    );
    Redirect::to(&url).into_response()
}

/// Redirect back to the registration page with an `error` or `message`.
fn redirect_to_register(form: &RegisterForm, kind: &str, text: &str) -> Response {
    let mut extra = vec![(kind, text)];
    if !form.email.is_empty() {
        extra.push(("email", form.email.as_str()));
    }
    Redirect::to(&form.params.page_url("/oauth2/register", &extra)).into_response()
}
