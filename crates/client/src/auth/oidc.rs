//! Authorization code flow with PKCE against the identity provider.

use super::cache::TokenRefresher;
use super::token::{TokenResponse, TokenSet};
use crate::config::OidcConfiguration;
use crate::error::AuthError;
use crate::transport::HttpClient;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::{Method, Request, header};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
use url::Url;

/// How long a started sign-in waits for its callback.
pub const PENDING_AUTHORIZATION_LIFETIME: Duration = Duration::minutes(10);
/// Outstanding sign-ins kept at once; the oldest is dropped beyond this.
pub const MAX_PENDING_AUTHORIZATIONS: usize = 16;

/// The parts of the discovery document the client uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Debug)]
struct PendingAuthorization {
    verifier: String,
    started_at: OffsetDateTime,
}

impl PendingAuthorization {
    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now - self.started_at >= PENDING_AUTHORIZATION_LIFETIME
    }
}

pub struct OidcClient<T> {
    http: T,
    config: OidcConfiguration,
    metadata: ProviderMetadata,
    /// Outstanding authorization requests, keyed by state
    pending: Mutex<HashMap<String, PendingAuthorization>>,
}

/// URL-safe random string from `len` random bytes.
fn random_token(len: usize) -> Result<String, getrandom::Error> {
    let mut buf = vec![0u8; len];
    getrandom::fill(&mut buf)?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// `S256` code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

impl<T: HttpClient> OidcClient<T> {
    pub fn new(http: T, config: OidcConfiguration, metadata: ProviderMetadata) -> Self {
        Self {
            http,
            config,
            metadata,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the provider's discovery document and build a client from it.
    #[tracing::instrument(skip(http, config), fields(authority = %config.authority))]
    pub async fn discover(http: T, config: OidcConfiguration) -> Result<Self, AuthError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            config.authority.trim_end_matches('/')
        );
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(header::ACCEPT, "application/json")
            .body(Vec::new())?;
        let response = http.send_http(request).await.map_err(AuthError::Transport)?;
        if !response.status().is_success() {
            return Err(AuthError::Http {
                status: response.status(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        let metadata: ProviderMetadata = serde_json::from_slice(response.body())?;
        tracing::debug!(issuer = %metadata.issuer, "Loaded provider metadata");
        Ok(Self::new(http, config, metadata))
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &OidcConfiguration {
        &self.config
    }

    /// Start a sign-in: returns the URL to send the user to.
    pub fn begin_authorization(&self) -> Result<Url, AuthError> {
        let state = random_token(16)?;
        let verifier = random_token(32)?;

        let mut url = Url::parse(&self.metadata.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", &self.config.response_type)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope())
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge(&verifier))
            .append_pair("code_challenge_method", "S256");

        self.remember(state, verifier, OffsetDateTime::now_utc());
        Ok(url)
    }

    /// Finish a sign-in from the URL the provider redirected back to.
    #[tracing::instrument(skip_all)]
    pub async fn complete_authorization(&self, callback_url: &str) -> Result<TokenSet, AuthError> {
        let url = Url::parse(callback_url.trim())?;
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let verifier = params
            .get("state")
            .and_then(|state| self.take(state, OffsetDateTime::now_utc()))
            .ok_or(AuthError::StateMismatch)?;

        if let Some(error) = params.get("error") {
            return Err(AuthError::Authorization {
                error: error.clone(),
                description: params.get("error_description").cloned(),
            });
        }
        let code = params.get("code").ok_or_else(|| AuthError::Authorization {
            error: "invalid_request".into(),
            description: Some("Callback carries no code".into()),
        })?;

        self.exchange_code(code, &verifier).await
    }

    /// Redeem an authorization code.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, AuthError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("client_id", &self.config.client_id),
            ("code_verifier", verifier),
        ])
        .await
    }

    /// Where to send the user to sign out.
    pub fn end_session_url(&self, state: Option<&str>) -> Result<Url, AuthError> {
        let mut url = match &self.metadata.end_session_endpoint {
            Some(endpoint) => Url::parse(endpoint)?,
            None => Url::parse(&format!(
                "{}/oauth2/logout",
                self.config.authority.trim_end_matches('/')
            ))?,
        };
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair(
                    "post_logout_redirect_uri",
                    &self.config.post_logout_redirect_uri,
                );
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, AuthError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.metadata.token_endpoint)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .body(body.into_bytes())?;

        let response = self
            .http
            .send_http(request)
            .await
            .map_err(AuthError::Transport)?;
        if !response.status().is_success() {
            return Err(AuthError::Http {
                status: response.status(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        let token: TokenResponse = serde_json::from_slice(response.body())?;
        TokenSet::from_response(token, OffsetDateTime::now_utc())
    }

    fn remember(&self, state: String, verifier: String, now: OffsetDateTime) {
        let mut pending = self.pending_requests();
        pending.retain(|_, p| !p.is_expired_at(now));
        while pending.len() >= MAX_PENDING_AUTHORIZATIONS {
            let Some(oldest) = pending
                .iter()
                .min_by_key(|(_, p)| p.started_at)
                .map(|(state, _)| state.clone())
            else {
                break;
            };
            tracing::debug!("Dropping oldest pending authorization");
            pending.remove(&oldest);
        }
        pending.insert(
            state,
            PendingAuthorization {
                verifier,
                started_at: now,
            },
        );
    }

    /// Remove the request for `state`, returning its verifier unless it has expired.
    fn take(&self, state: &str, now: OffsetDateTime) -> Option<String> {
        self.pending_requests()
            .remove(state)
            .filter(|p| !p.is_expired_at(now))
            .map(|p| p.verifier)
    }

    fn pending_requests(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, PendingAuthorization>> {
        // A poisoned map only holds verifiers; keep using it
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<T: HttpClient> TokenRefresher for OidcClient<T> {
    #[tracing::instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let mut tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
            ])
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;
        // Providers may keep the refresh token unchanged
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    fn reauthentication_url(&self) -> Result<String, AuthError> {
        self.begin_authorization().map(String::from)
    }
}
