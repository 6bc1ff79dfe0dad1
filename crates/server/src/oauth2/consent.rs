//! Consent screen for clients registered with `require_consent`.
//!
//! Login parks the validated request in [`OAuth2State`] under a random handle. The handle
//! expires after ten minutes and can be answered once.

use crate::oauth2::{ScopeInfo, message_page, render_page, state::OAuth2State};
use askama::Template;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

const EXPIRED: &str = "This consent request has expired or was already answered. Please try signing in again.";

#[derive(Template)]
#[template(path = "consent.html")]
struct ConsentTemplate {
    user_name: String,
    client_name: String,
    scopes: Vec<ScopeInfo>,
    consent_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsentQuery {
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAction {
    Approve,
    Deny,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentForm {
    pub consent_token: String,
    pub action: ConsentAction,
}

pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .routes(routes!(consent_page))
        .routes(routes!(consent_submit))
}

/// Show the client name and the requested scopes.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    get,
    path = "/consent",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Consent Page",
    summary = "Consent screen",
    description = "Lists the scopes a client asked for, for a user who has just signed in.",
    params(
        ("token" = String, Query, description = "Opaque handle of the pending consent request."),
    ),
    responses(
        (status = 200, description = "Consent page HTML"),
        (status = 400, description = "Error page HTML if the handle is unknown or expired"),
    )
)]
async fn consent_page(
    State(state): State<OAuth2State>,
    Query(params): Query<ConsentQuery>,
) -> Response {
    let Some(pending) = state.peek_consent(&params.token).await else {
        return message_page(StatusCode::BAD_REQUEST, "Consent expired", EXPIRED);
    };

    let template = ConsentTemplate {
        user_name: pending.user_name,
        client_name: pending.authorization.client.name.clone(),
        scopes: ScopeInfo::list(&pending.authorization.scope),
        consent_token: params.token,
    };
    render_page(&template, "consent.html")
}

#[tracing::instrument(skip(state, form), fields(action = ?form.action))]
#[utoipa::path(
    post,
    path = "/consent",
    tag = super::OAUTH2_TAG,
    operation_id = "OAuth2 Consent Submit",
    summary = "Answer the consent screen",
    description = "`approve` issues the authorization code; `deny` sends the client `access_denied`. \
                   Either way the handle is spent.",
    request_body(
        content = ConsentForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Handle and decision"
    ),
    responses(
        (status = 303, description = "Redirect to client with authorization code or error"),
        (status = 400, description = "Error page HTML if the handle is unknown or expired"),
    )
)]
async fn consent_submit(
    State(state): State<OAuth2State>,
    Form(form): Form<ConsentForm>,
) -> Response {
    let Some(pending) = state.take_consent(&form.consent_token).await else {
        return message_page(StatusCode::BAD_REQUEST, "Consent expired", EXPIRED);
    };
    let authorization = pending.authorization;

    if form.action == ConsentAction::Deny {
        tracing::info!(user_id = %pending.user_id, client_id = %authorization.client.id, "User denied consent");
        return authorization.error_redirect("access_denied", "User denied the request");
    }

    match state
        .issue_authorization_code(&authorization, &pending.user_id)
        .await
    {
        Ok(code) => {
            tracing::info!(
                user_id = %pending.user_id,
                client_id = %authorization.client.id,
                "User granted consent"
            );
            authorization.code_redirect(&code)
        }
        Err(e) => e.into_response(),
    }
}
