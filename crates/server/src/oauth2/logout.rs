//! End-session endpoint.

use crate::entity::oauth2_client;
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::{message_page, request::redirect_with, state::OAuth2State};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use sea_orm::EntityTrait;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogoutParams {
    /// Client whose post-logout redirect allowlist applies
    pub client_id: Option<String>,
    /// Must exactly match a registered post-logout redirect URI
    pub post_logout_redirect_uri: Option<String>,
    /// Returned unchanged on the redirect
    pub state: Option<String>,
}

pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new().routes(routes!(logout))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/logout",
    tag = super::OAUTH2_TAG,
    operation_id = "OpenID Connect End Session",
    summary = "End the user's session",
    description = "Signs the user out. When `post_logout_redirect_uri` is given it must exactly match one \
                   of the client's registered post-logout redirect URIs; the user is then redirected there \
                   with `state`.",
    params(LogoutParams),
    responses(
        (status = 200, description = "Signed-out page HTML"),
        (status = 303, description = "Redirect to the registered post-logout redirect URI"),
        (status = 400, description = "Unregistered post-logout redirect URI", body = ErrorResponse),
    )
)]
async fn logout(
    State(state): State<OAuth2State>,
    Query(params): Query<LogoutParams>,
) -> Result<Response, OAuthError> {
    let Some(uri) = params.post_logout_redirect_uri.as_deref() else {
        return Ok(message_page(
            StatusCode::OK,
            "Signed out",
            "You are now signed out.",
        ));
    };

    let client_id = params.client_id.as_deref().ok_or_else(|| {
        OAuthError::InvalidRequest("client_id is required with post_logout_redirect_uri".into())
    })?;
    let client = oauth2_client::Entity::find_by_id(client_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Client not found"))?;

    if !client.is_post_logout_redirect_uri_allowed(uri) {
        tracing::warn!(client_id, post_logout_redirect_uri = uri, "Rejected unregistered post-logout redirect");
        return Err(OAuthError::InvalidRequest(
            "post_logout_redirect_uri is not registered for this client".into(),
        ));
    }

    let mut pairs = Vec::new();
    if let Some(s) = params.state.as_deref() {
        pairs.push(("state", s));
    }
    Ok(redirect_with(uri, &pairs))
}
