//! Protocol endpoints of the provider: authorize, token, revoke, userinfo and discovery.
//!
//! Interactive pages (login, consent, registration, logout) live in their own modules.

use crate::catalog::{self, OFFLINE_ACCESS_SCOPE, OPENID_SCOPE};
use crate::entity::{identity_user, identity_user_claim, oauth2_authorization, oauth2_client, oauth2_token};
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::request::{AuthorizationParams, AuthorizeError, validate_authorization_request};
use crate::oauth2::{OAUTH2_TAG, bearer, password::generate_token, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::Engine;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Routes mounted under `/oauth2`.
pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(userinfo))
}

/// Routes mounted at the server root.
pub fn discovery_router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new().routes(routes!(openid_configuration))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
}

/// Claims about the authenticated user, limited to the granted identity scopes.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub claims: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub end_session_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
///
/// Validates the request against the client registry and sends the user to the login page.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start the authorization code flow",
    description = "Starts the Authorization Code flow. The request is checked against the client \
                   registry (exact redirect URI match, scope allowlist, PKCE policy) and the user is \
                   redirected to the login page. After authentication the user is redirected back to \
                   the client's redirect_uri with a single-use authorization code.\n\n\
                   An unregistered redirect_uri is never redirected to.",
    params(AuthorizationParams),
    responses(
        (status = 303, description = "Redirect to login page, or to the client with an error"),
        (status = 400, description = "Unknown client, unregistered redirect URI, invalid scope or PKCE parameters", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizationParams>,
) -> Result<Response, AuthorizeError> {
    validate_authorization_request(state.db.as_ref(), &params).await?;
    Ok(Redirect::to(&params.page_url("/oauth2/login", &[])).into_response())
}

/// Redeems codes and refresh tokens. Responses are never cached.
#[tracing::instrument(skip(state, headers, params), fields(grant_type = %params.grant_type))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Issue tokens",
    description = "`grant_type=authorization_code` redeems a code exactly once. A wrong or missing \
                   `code_verifier` fails with `invalid_grant` and still burns the code.\n\n\
                   `grant_type=refresh_token` rotates the refresh token. A `scope` parameter may only \
                   narrow the original grant.\n\n\
                   Public clients identify themselves with `client_id` in the form. Clients with a \
                   secret may use HTTP Basic instead.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Grant parameters"
    ),
    responses(
        (status = 200, description = "Opaque bearer token, plus a refresh token when offline access was granted", body = TokenResponse),
        (status = 400, description = "Invalid request, code or PKCE verifier", body = ErrorResponse),
        (status = 401, description = "`invalid_client`", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let client = authenticate_client(&state, &headers, &params).await?;

    let grant_type = params.grant_type.clone();
    let issued = match grant_type.as_str() {
        "authorization_code" => {
            require_grant_type(&client, "authorization_code")?;
            handle_authorization_code_grant(&state, &client, params).await?
        }
        "refresh_token" => {
            require_grant_type(&client, "refresh_token")?;
            handle_refresh_token_grant(&state, &client, params).await?
        }
        other => {
            return Err(OAuthError::UnsupportedGrantType(format!(
                "Grant type '{other}' is not supported"
            )));
        }
    };

    let mut response = (StatusCode::OK, Json(issued)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// RFC 7009 revocation. The hinted token kind is looked up first.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke a token",
    description = "Marks the grant holding the given access or refresh token as revoked. Both tokens \
                   of the grant stop working. Unknown tokens are not an error.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "The token, with an optional `token_type_hint`"
    ),
    responses(
        (status = 200, description = "Always, per RFC 7009"),
    )
)]
pub async fn revoke(State(state): State<OAuth2State>, Form(params): Form<RevokeRequest>) -> Response {
    let by_access = oauth2_token::Column::AccessToken.eq(&params.token);
    let by_refresh = oauth2_token::Column::RefreshToken.eq(&params.token);

    let (first, second) = match params.token_type_hint.as_deref() {
        Some("refresh_token") => (by_refresh, by_access),
        Some("access_token") | None => (by_access, by_refresh),
        Some(unknown_hint) => {
            // RFC 7009 Section 2.1: unrecognized hints are ignored
            tracing::debug!(hint = unknown_hint, "Unknown token_type_hint");
            (by_access, by_refresh)
        }
    };

    let mut token = oauth2_token::Entity::find()
        .filter(first)
        .one(state.db.as_ref())
        .await;
    if matches!(&token, Ok(None)) {
        token = oauth2_token::Entity::find()
            .filter(second)
            .one(state.db.as_ref())
            .await;
    }

    match token {
        Ok(Some(t)) if !t.is_revoked() => {
            let mut active: oauth2_token::ActiveModel = t.into();
            active.revoked_at = Set(Some(OffsetDateTime::now_utc()));
            if let Err(e) = active.update(state.db.as_ref()).await {
                tracing::error!("Could not mark token revoked: {}", e);
            }
        }
        Ok(_) => {
            // RFC 7009 Section 2.2: unknown or already revoked tokens are not an error
        }
        Err(e) => {
            tracing::error!("Token lookup for revocation failed: {}", e);
        }
    }

    StatusCode::OK.into_response()
}

/// Claims of the token's subject, filtered by the identity scopes granted.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Claims of the signed-in user",
    description = "Needs a bearer token carrying `openid`. Claims released per scope:\n\
                   - `openid`: `sub`\n\
                   - `profile`: `name`, `given_name`, `family_name`\n\
                   - `email`: `email`, `email_verified`",
    security(
        ("Authorization" = [])
    ),
    responses(
        (status = 200, description = "User claims", body = UserInfoResponse),
        (status = 401, description = "`invalid_token`", body = ErrorResponse),
        (status = 403, description = "`insufficient_scope`: no `openid` in the grant", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
) -> Result<Json<UserInfoResponse>, OAuthError> {
    let token = bearer::authenticate(state.db.as_ref(), &headers).await?;
    bearer::require_scope(&token, OPENID_SCOPE)?;

    let user = identity_user::Entity::find_by_id(&token.user_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::InvalidToken("Subject no longer exists".into()))?;

    let released = catalog::claims_for_scopes(token.scope.split_whitespace());
    let stored = identity_user_claim::Entity::find()
        .filter(identity_user_claim::Column::UserId.eq(&user.id))
        .all(state.db.as_ref())
        .await?;

    let mut claims = BTreeMap::new();
    for claim in stored {
        if released.iter().any(|c| *c == claim.claim_type) {
            claims.insert(claim.claim_type, serde_json::Value::String(claim.claim_value));
        }
    }
    if released.contains(&"email") {
        claims
            .entry("email".to_string())
            .or_insert_with(|| serde_json::Value::String(user.email.clone()));
    }
    if released.contains(&"email_verified") {
        claims.insert(
            "email_verified".to_string(),
            serde_json::Value::Bool(user.email_confirmed),
        );
    }

    Ok(Json(UserInfoResponse {
        sub: user.id,
        claims,
    }))
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "Provider metadata",
    description = "Endpoint URLs and capabilities, derived from the configured issuer and the scope catalog.",
    responses(
        (status = 200, description = "Discovery document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let issuer = &state.issuer_url;
    let mut claims_supported: Vec<String> = Vec::new();
    for resource in catalog::IDENTITY_RESOURCES {
        for claim in resource.claims {
            if !claims_supported.iter().any(|c| c == claim) {
                claims_supported.push(claim.to_string());
            }
        }
    }

    Json(OpenIdConfiguration {
        issuer: issuer.clone(),
        authorization_endpoint: format!("{issuer}/oauth2/authorize"),
        token_endpoint: format!("{issuer}/oauth2/token"),
        userinfo_endpoint: format!("{issuer}/oauth2/userinfo"),
        revocation_endpoint: format!("{issuer}/oauth2/revoke"),
        end_session_endpoint: format!("{issuer}/oauth2/logout"),
        response_types_supported: vec!["code".to_string()],
        response_modes_supported: vec!["query".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        subject_types_supported: vec!["public".to_string()],
        scopes_supported: catalog::supported_scopes()
            .into_iter()
            .map(String::from)
            .collect(),
        claims_supported,
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "none".to_string(),
        ],
        code_challenge_methods_supported: vec!["S256".to_string(), "plain".to_string()],
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        let id = urlencoding::decode(id).map(|s| s.into_owned()).unwrap_or_else(|_| id.to_string());
        let secret = urlencoding::decode(secret)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| secret.to_string());
        return (Some(id), Some(secret));
    }

    // Fall back to form body
    (params.client_id.clone(), params.client_secret.clone())
}

async fn authenticate_client(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: &TokenRequest,
) -> Result<oauth2_client::Model, OAuthError> {
    let (client_id, client_secret) = extract_client_credentials(headers, params);
    let client_id =
        client_id.ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;

    let client = oauth2_client::Entity::find_by_id(&client_id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::invalid_client_at_token("Client not found"))?;

    if client.require_client_secret {
        match (&client.secret, client_secret) {
            (Some(stored), Some(provided)) if stored == &provided => {}
            _ => {
                return Err(OAuthError::invalid_client_at_token(
                    "Client authentication failed",
                ));
            }
        }
    }

    Ok(client)
}

fn require_grant_type(client: &oauth2_client::Model, grant_type: &str) -> Result<(), OAuthError> {
    if client.is_grant_type_allowed(grant_type) {
        Ok(())
    } else {
        Err(OAuthError::UnauthorizedClient(format!(
            "Client may not use the {grant_type} grant"
        )))
    }
}

async fn handle_authorization_code_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let code = params
        .code
        .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;

    let auth = oauth2_authorization::Entity::find_by_id(&code)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("Authorization code not found".into()))?;

    // Consumed before any other check; only the request that deletes the row proceeds.
    let deleted = oauth2_authorization::Entity::delete_by_id(&code)
        .exec(state.db.as_ref())
        .await?;
    if deleted.rows_affected != 1 {
        return Err(OAuthError::InvalidGrant(
            "Authorization code already used".into(),
        ));
    }

    if auth.is_expired() {
        return Err(OAuthError::InvalidGrant("Authorization code expired".into()));
    }
    if auth.client_id != client.id {
        return Err(OAuthError::InvalidGrant("Client ID mismatch".into()));
    }
    if let Some(ref uri) = params.redirect_uri
        && &auth.redirect_uri != uri
    {
        return Err(OAuthError::InvalidGrant("Redirect URI mismatch".into()));
    }
    if !auth.verify_pkce(params.code_verifier.as_deref()) {
        tracing::warn!(client_id = %client.id, "PKCE verification failed");
        return Err(OAuthError::InvalidGrant("PKCE verification failed".into()));
    }

    let with_refresh = client.allow_offline_access
        && client.is_grant_type_allowed("refresh_token")
        && auth.scope.split_whitespace().any(|s| s == OFFLINE_ACCESS_SCOPE);

    issue_tokens(state, client, &auth.user_id, &auth.scope, with_refresh).await
}

async fn handle_refresh_token_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let refresh_token = params
        .refresh_token
        .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;

    let existing = oauth2_token::Entity::find()
        .filter(oauth2_token::Column::RefreshToken.eq(&refresh_token))
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| OAuthError::InvalidGrant("Refresh token not found".into()))?;

    if existing.client_id != client.id {
        return Err(OAuthError::InvalidGrant(
            "Token does not belong to this client".into(),
        ));
    }
    if !existing.refreshable_at(OffsetDateTime::now_utc()) {
        return Err(OAuthError::InvalidGrant(
            "Refresh token is invalid or expired".into(),
        ));
    }

    let scope = match params.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(requested) => {
            if let Some(extra) = requested.split_whitespace().find(|s| !existing.has_scope(s)) {
                return Err(OAuthError::InvalidScope(format!(
                    "Scope '{extra}' was not part of the original grant"
                )));
            }
            requested.to_string()
        }
        None => existing.scope.clone(),
    };

    // Rotation: only the request that flips revoked_at gets new tokens.
    let rotated = oauth2_token::Entity::update_many()
        .col_expr(
            oauth2_token::Column::RevokedAt,
            Expr::value(OffsetDateTime::now_utc()),
        )
        .filter(oauth2_token::Column::Id.eq(&existing.id))
        .filter(oauth2_token::Column::RevokedAt.is_null())
        .exec(state.db.as_ref())
        .await?;
    if rotated.rows_affected != 1 {
        return Err(OAuthError::InvalidGrant(
            "Refresh token is invalid or expired".into(),
        ));
    }

    issue_tokens(state, client, &existing.user_id, &scope, true).await
}

async fn issue_tokens(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    user_id: &str,
    scope: &str,
    with_refresh: bool,
) -> Result<TokenResponse, OAuthError> {
    let now = OffsetDateTime::now_utc();
    let access_token = generate_token()?;
    let refresh_token = if with_refresh {
        Some(generate_token()?)
    } else {
        None
    };

    oauth2_token::ActiveModel {
        id: Set(uuid::Uuid::new_v4().to_string()),
        access_token: Set(access_token.clone()),
        refresh_token: Set(refresh_token.clone()),
        token_type: Set("Bearer".to_string()),
        client_id: Set(client.id.clone()),
        user_id: Set(user_id.to_string()),
        scope: Set(scope.to_string()),
        audience: Set(catalog::audiences_for_scopes(scope.split_whitespace()).join(" ")),
        access_token_expires_at: Set(now + Duration::seconds(state.access_token_lifetime)),
        refresh_token_expires_at: Set(refresh_token
            .as_ref()
            .map(|_| now + Duration::seconds(state.refresh_token_lifetime))),
        created_at: Set(now),
        revoked_at: Set(None),
    }
    .insert(state.db.as_ref())
    .await?;

    tracing::info!(client_id = %client.id, user_id, scope, "Issued access token");

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.access_token_lifetime,
        refresh_token,
        scope: scope.to_string(),
    })
}
