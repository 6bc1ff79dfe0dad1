//! Authorization request validation.
//!
//! Both `GET /oauth2/authorize` and the login form submission run the same checks, so a
//! request posted straight to the login form cannot skip the client, redirect, scope or
//! PKCE policy.

use crate::catalog::OPENID_SCOPE;
use crate::entity::oauth2_client;
use crate::error::OAuthError;
use crate::oauth2::pkce::CodeChallengeMethod;
use axum::response::{IntoResponse, Redirect, Response};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Parameters of an authorization request, carried unchanged through login and consent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizationParams {
    /// Must be "code" for Authorization Code flow
    #[serde(default)]
    pub response_type: String,
    /// Client identifier issued during registration
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI (must exactly match a registered URI)
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value returned unchanged on the redirect
    pub state: Option<String>,
    /// OpenID Connect nonce
    pub nonce: Option<String>,
    /// PKCE code challenge (base64url-encoded)
    pub code_challenge: Option<String>,
    /// PKCE method: "S256" or "plain"
    pub code_challenge_method: Option<String>,
    /// User name or email hint to pre-fill the login form
    pub login_hint: Option<String>,
}

impl AuthorizationParams {
    /// Query-string pairs for the non-empty parameters.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("response_type", self.response_type.as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let optional = [
            ("redirect_uri", &self.redirect_uri),
            ("scope", &self.scope),
            ("state", &self.state),
            ("nonce", &self.nonce),
            ("code_challenge", &self.code_challenge),
            ("code_challenge_method", &self.code_challenge_method),
            ("login_hint", &self.login_hint),
        ];
        pairs.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.as_deref().map(|v| (key, v))),
        );
        pairs.retain(|(_, value)| !value.is_empty());
        pairs
    }

    /// Relative URL of an interactive page with these parameters plus `extra`.
    pub fn page_url(&self, path: &str, extra: &[(&str, &str)]) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.pairs() {
            serializer.append_pair(key, value);
        }
        for (key, value) in extra {
            serializer.append_pair(key, value);
        }
        format!("{path}?{}", serializer.finish())
    }
}

/// An authorization request that passed every policy check.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    pub client: oauth2_client::Model,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
}

impl ValidatedAuthorization {
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    /// Redirect carrying the authorization code back to the client.
    pub fn code_redirect(&self, code: &str) -> Response {
        let mut pairs = vec![("code", code)];
        if let Some(state) = self.state.as_deref() {
            pairs.push(("state", state));
        }
        redirect_with(&self.redirect_uri, &pairs)
    }

    /// Redirect carrying an error back to the client.
    pub fn error_redirect(&self, error: &str, description: &str) -> Response {
        let mut pairs = vec![("error", error), ("error_description", description)];
        if let Some(state) = self.state.as_deref() {
            pairs.push(("state", state));
        }
        redirect_with(&self.redirect_uri, &pairs)
    }
}

/// Failure of an authorization request.
///
/// Errors found before the redirect URI is trusted are returned to the user agent directly;
/// `unsupported_response_type` is reported to the validated redirect URI.
#[derive(Debug)]
pub enum AuthorizeError {
    Direct(OAuthError),
    Redirect {
        redirect_uri: String,
        state: Option<String>,
        error: OAuthError,
    },
}

impl From<OAuthError> for AuthorizeError {
    fn from(error: OAuthError) -> Self {
        Self::Direct(error)
    }
}

impl From<sea_orm::DbErr> for AuthorizeError {
    fn from(error: sea_orm::DbErr) -> Self {
        Self::Direct(error.into())
    }
}

impl IntoResponse for AuthorizeError {
    fn into_response(self) -> Response {
        match self {
            Self::Direct(error) => error.into_response(),
            Self::Redirect {
                redirect_uri,
                state,
                error,
            } => {
                let description = error.description().unwrap_or_default();
                let mut pairs = vec![
                    ("error", error.code()),
                    ("error_description", description.as_str()),
                ];
                if let Some(state) = state.as_deref() {
                    pairs.push(("state", state));
                }
                redirect_with(&redirect_uri, &pairs)
            }
        }
    }
}

/// Check an authorization request against the client registry.
#[tracing::instrument(skip(db, params), fields(client_id = %params.client_id))]
pub async fn validate_authorization_request(
    db: &DatabaseConnection,
    params: &AuthorizationParams,
) -> Result<ValidatedAuthorization, AuthorizeError> {
    if params.client_id.is_empty() {
        return Err(OAuthError::InvalidRequest("client_id is required".into()).into());
    }
    let client = oauth2_client::Entity::find_by_id(&params.client_id)
        .one(db)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Client not found"))?;

    let redirect_uri = resolve_redirect_uri(&client, params.redirect_uri.as_deref())?;

    if params.response_type != "code" {
        return Err(AuthorizeError::Redirect {
            redirect_uri,
            state: params.state.clone(),
            error: OAuthError::UnsupportedResponseType(
                "Only 'code' response type is supported".into(),
            ),
        });
    }

    if !client.is_grant_type_allowed("authorization_code") {
        return Err(OAuthError::UnauthorizedClient(
            "Client may not use the authorization code grant".into(),
        )
        .into());
    }

    let scope = resolve_scope(&client, params.scope.as_deref())?;
    let (code_challenge, code_challenge_method) = resolve_pkce(
        &client,
        params.code_challenge.as_deref(),
        params.code_challenge_method.as_deref(),
    )?;

    Ok(ValidatedAuthorization {
        client,
        redirect_uri,
        scope,
        state: params.state.clone(),
        nonce: params.nonce.clone(),
        code_challenge,
        code_challenge_method,
    })
}

/// Exact match only. A missing URI is accepted when exactly one is registered.
fn resolve_redirect_uri(
    client: &oauth2_client::Model,
    requested: Option<&str>,
) -> Result<String, OAuthError> {
    match requested {
        Some(uri) if client.is_redirect_uri_allowed(uri) => Ok(uri.to_string()),
        Some(uri) => {
            tracing::warn!(client_id = %client.id, redirect_uri = uri, "Rejected unregistered redirect_uri");
            Err(OAuthError::InvalidRedirectUri(
                "redirect_uri is not registered for this client".into(),
            ))
        }
        None => match client.redirect_uris_list().as_slice() {
            [only] => Ok(only.clone()),
            _ => Err(OAuthError::InvalidRedirectUri(
                "redirect_uri is required".into(),
            )),
        },
    }
}

/// Every requested scope must be allowed; nothing is added or dropped.
fn resolve_scope(
    client: &oauth2_client::Model,
    requested: Option<&str>,
) -> Result<String, OAuthError> {
    let requested = requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(OPENID_SCOPE);

    let mut scopes: Vec<&str> = Vec::new();
    for scope in requested.split_whitespace() {
        if !client.is_scope_allowed(scope) {
            return Err(OAuthError::InvalidScope(format!(
                "Scope '{scope}' is not allowed for this client"
            )));
        }
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    Ok(scopes.join(" "))
}

fn resolve_pkce(
    client: &oauth2_client::Model,
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<(Option<String>, Option<CodeChallengeMethod>), OAuthError> {
    let Some(challenge) = challenge.filter(|c| !c.is_empty()) else {
        if client.require_pkce {
            return Err(OAuthError::InvalidRequest(
                "code_challenge is required".into(),
            ));
        }
        return Ok((None, None));
    };

    let method = match method {
        Some(m) => m
            .parse::<CodeChallengeMethod>()
            .map_err(OAuthError::InvalidRequest)?,
        None => CodeChallengeMethod::Plain,
    };
    if method == CodeChallengeMethod::Plain && !client.allow_plain_text_pkce {
        return Err(OAuthError::InvalidRequest(
            "Plain code_challenge_method is not allowed".into(),
        ));
    }
    if !(43..=128).contains(&challenge.len()) {
        return Err(OAuthError::InvalidRequest(
            "code_challenge has an invalid length".into(),
        ));
    }

    Ok((Some(challenge.to_string()), Some(method)))
}

/// Append query parameters to a registered URI and redirect (303) to it.
pub fn redirect_with(uri: &str, pairs: &[(&str, &str)]) -> Response {
    match url::Url::parse(uri) {
        Ok(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in pairs {
                    query.append_pair(key, value);
                }
            }
            Redirect::to(url.as_str()).into_response()
        }
        Err(e) => {
            tracing::error!(redirect_uri = uri, error = %e, "Registered redirect_uri is not a valid URL");
            OAuthError::InvalidRedirectUri("redirect_uri is not a valid URL".into()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn client() -> oauth2_client::Model {
        oauth2_client::Model {
            id: "blazorOIDC".into(),
            name: "Blazor OIDC".into(),
            secret: None,
            require_client_secret: false,
            grant_types: "authorization_code".into(),
            require_pkce: true,
            allow_plain_text_pkce: false,
            redirect_uris: r#"["https://localhost:5000/authentication/login-callback"]"#.into(),
            post_logout_redirect_uris: "[]".into(),
            allowed_scopes: "openid profile email blazorOIDCApi".into(),
            allowed_cors_origins: "[]".into(),
            require_consent: false,
            allow_offline_access: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn redirect_uri_must_match_exactly() {
        let c = client();
        assert!(resolve_redirect_uri(&c, Some("https://localhost:5000/authentication/login-callback")).is_ok());
        let err = resolve_redirect_uri(&c, Some("https://localhost:5000/authentication/login-callback/")).unwrap_err();
        assert_eq!(err.code(), "invalid_redirect_uri");
    }

    #[test]
    fn single_registered_redirect_is_used_when_omitted() {
        let uri = resolve_redirect_uri(&client(), None).unwrap();
        assert_eq!(uri, "https://localhost:5000/authentication/login-callback");
    }

    #[test]
    fn missing_redirect_is_rejected_with_several_registered() {
        let mut c = client();
        c.redirect_uris = r#"["https://a.example/cb","https://b.example/cb"]"#.into();
        assert!(resolve_redirect_uri(&c, None).is_err());
    }

    #[test]
    fn scope_defaults_to_openid() {
        assert_eq!(resolve_scope(&client(), None).unwrap(), "openid");
        assert_eq!(resolve_scope(&client(), Some("  ")).unwrap(), "openid");
    }

    #[test]
    fn scope_outside_allowlist_is_rejected_not_narrowed() {
        let err = resolve_scope(&client(), Some("openid offline_access")).unwrap_err();
        assert_eq!(err.code(), "invalid_scope");
    }

    #[test]
    fn duplicate_scopes_collapse() {
        assert_eq!(
            resolve_scope(&client(), Some("openid openid blazorOIDCApi")).unwrap(),
            "openid blazorOIDCApi"
        );
    }

    #[test]
    fn pkce_required_and_plain_refused() {
        let c = client();
        assert_eq!(
            resolve_pkce(&c, None, None).unwrap_err().code(),
            "invalid_request"
        );
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(resolve_pkce(&c, Some(challenge), Some("plain")).is_err());
        assert!(resolve_pkce(&c, Some(challenge), None).is_err());
        let (stored, method) = resolve_pkce(&c, Some(challenge), Some("S256")).unwrap();
        assert_eq!(stored.as_deref(), Some(challenge));
        assert_eq!(method, Some(CodeChallengeMethod::S256));
    }

    #[test]
    fn page_url_encodes_parameters() {
        let params = AuthorizationParams {
            response_type: "code".into(),
            client_id: "blazorOIDC".into(),
            redirect_uri: Some("https://localhost:5000/cb".into()),
            scope: Some("openid profile".into()),
            ..Default::default()
        };
        let url = params.page_url("/oauth2/login", &[("error", "Bad things")]);
        assert!(url.starts_with("/oauth2/login?response_type=code&client_id=blazorOIDC"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Flocalhost%3A5000%2Fcb"));
        assert!(url.contains("scope=openid+profile"));
        assert!(url.ends_with("error=Bad+things"));
    }
}
