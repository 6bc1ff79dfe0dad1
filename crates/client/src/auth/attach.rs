//! Per-destination bearer token attachment.

use super::cache::AccessTokenProvider;
use crate::error::{AuthError, BoxError};
use crate::transport::HttpClient;
use async_trait::async_trait;
use http::{HeaderValue, Request, Response, header};
use std::sync::Arc;
use url::Url;

/// Mapping of authorized URL prefixes to the token source for each.
#[derive(Clone, Default)]
pub struct AuthorizedUrls {
    entries: Vec<(Url, Arc<dyn AccessTokenProvider>)>,
}

impl AuthorizedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prefix: Url, provider: Arc<dyn AccessTokenProvider>) -> Self {
        self.insert(prefix, provider);
        self
    }

    pub fn insert(&mut self, prefix: Url, provider: Arc<dyn AccessTokenProvider>) {
        self.entries.push((prefix, provider));
    }

    /// The provider of the first prefix `target` falls under.
    pub fn provider_for(&self, target: &Url) -> Option<&Arc<dyn AccessTokenProvider>> {
        self.entries
            .iter()
            .find(|(prefix, _)| matches_prefix(prefix, target))
            .map(|(_, provider)| provider)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Same origin, and the path equals the prefix path or continues it at a segment boundary.
pub fn matches_prefix(prefix: &Url, target: &Url) -> bool {
    if prefix.scheme() != target.scheme()
        || prefix.host_str().map(str::to_ascii_lowercase)
            != target.host_str().map(str::to_ascii_lowercase)
        || prefix.port_or_known_default() != target.port_or_known_default()
    {
        return false;
    }

    let base = prefix.path().trim_end_matches('/');
    let path = target.path();
    if base.is_empty() {
        return true;
    }
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Wraps a transport and adds `Authorization: Bearer` for authorized destinations.
pub struct AuthorizingClient<T> {
    inner: T,
    urls: AuthorizedUrls,
}

impl<T: HttpClient> AuthorizingClient<T> {
    pub fn new(inner: T, urls: AuthorizedUrls) -> Self {
        Self { inner, urls }
    }

    /// Send `request`, attaching a token first when its target is authorized.
    ///
    /// Fails without sending anything if a token is needed but cannot be obtained.
    #[tracing::instrument(skip_all, fields(uri = %request.uri()))]
    pub async fn send(&self, mut request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, AuthError> {
        let target = Url::parse(&request.uri().to_string())?;
        if let Some(provider) = self.urls.provider_for(&target) {
            let token = provider.access_token().await?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AuthError::Request(e.into()))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
            tracing::debug!("Attached bearer token");
        } else {
            request.headers_mut().remove(header::AUTHORIZATION);
        }
        self.inner
            .send_http(request)
            .await
            .map_err(AuthError::Transport)
    }
}

#[async_trait]
impl<T: HttpClient> HttpClient for AuthorizingClient<T> {
    async fn send_http(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, BoxError> {
        Ok(self.send(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn exact_and_segment_prefix_match() {
        let prefix = url("https://localhost:5002/api/");
        assert!(matches_prefix(&prefix, &url("https://localhost:5002/api")));
        assert!(matches_prefix(&prefix, &url("https://localhost:5002/api/")));
        assert!(matches_prefix(
            &prefix,
            &url("https://localhost:5002/api/WeatherForecast?days=5")
        ));
        assert!(!matches_prefix(&prefix, &url("https://localhost:5002/apiary")));
        assert!(!matches_prefix(&prefix, &url("https://localhost:5002/")));
    }

    #[test]
    fn origin_must_match() {
        let prefix = url("https://localhost:5002/");
        assert!(matches_prefix(&prefix, &url("https://LOCALHOST:5002/WeatherForecast")));
        assert!(!matches_prefix(&prefix, &url("http://localhost:5002/WeatherForecast")));
        assert!(!matches_prefix(&prefix, &url("https://localhost:5003/WeatherForecast")));
        assert!(!matches_prefix(&prefix, &url("https://localhost.evil.test:5002/")));
    }

    #[test]
    fn default_port_is_normalized() {
        assert!(matches_prefix(
            &url("https://api.example.com/"),
            &url("https://api.example.com:443/WeatherForecast")
        ));
    }
}
