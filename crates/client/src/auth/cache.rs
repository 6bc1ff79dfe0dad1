//! Token cache with single-flight refresh.
//!
//! All callers go through one async mutex. The first caller to find the access token expired
//! performs the refresh while holding the lock; callers queued behind it re-check the cached
//! token and reuse the refreshed one.

use super::token::TokenSet;
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Supplies the bearer token for outgoing requests.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Obtains new tokens when the cached ones expire.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;

    /// Where to send the user when no refresh is possible.
    fn reauthentication_url(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl<T: TokenRefresher + ?Sized> TokenRefresher for Arc<T> {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        (**self).refresh(refresh_token).await
    }

    fn reauthentication_url(&self) -> Result<String, AuthError> {
        (**self).reauthentication_url()
    }
}

pub struct TokenCache<R> {
    refresher: R,
    tokens: Mutex<Option<TokenSet>>,
}

impl<R: TokenRefresher> TokenCache<R> {
    pub fn new(refresher: R) -> Self {
        Self {
            refresher,
            tokens: Mutex::new(None),
        }
    }

    pub fn with_tokens(refresher: R, tokens: TokenSet) -> Self {
        Self {
            refresher,
            tokens: Mutex::new(Some(tokens)),
        }
    }

    /// Replace the cached tokens, e.g. after a completed sign-in.
    pub async fn store(&self, tokens: TokenSet) {
        *self.tokens.lock().await = Some(tokens);
    }

    pub async fn clear(&self) {
        self.tokens.lock().await.take();
    }

    pub async fn current(&self) -> Option<TokenSet> {
        self.tokens.lock().await.clone()
    }

    fn reauthenticate(&self) -> AuthError {
        match self.refresher.reauthentication_url() {
            Ok(redirect_url) => AuthError::ReauthenticationRequired { redirect_url },
            Err(e) => e,
        }
    }
}

#[async_trait]
impl<R: TokenRefresher> AccessTokenProvider for TokenCache<R> {
    #[tracing::instrument(skip(self))]
    async fn access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.tokens.lock().await;

        let refresh_token = match guard.as_ref() {
            Some(tokens) if !tokens.is_expired() => return Ok(tokens.access_token.clone()),
            Some(tokens) => tokens.refresh_token.clone(),
            None => None,
        };
        let Some(refresh_token) = refresh_token else {
            guard.take();
            tracing::info!("No usable token, sign-in required");
            return Err(self.reauthenticate());
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(tokens) => {
                tracing::debug!(expires_at = %tokens.expires_at, "Refreshed access token");
                let access_token = tokens.access_token.clone();
                *guard = Some(tokens);
                Ok(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                guard.take();
                Err(self.reauthenticate())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::{Duration, OffsetDateTime};

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _: &str) -> Result<TokenSet, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(AuthError::Refresh("invalid_grant".into()));
            }
            Ok(TokenSet {
                access_token: format!("fresh-{n}"),
                refresh_token: Some("r2".into()),
                expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
                scope: None,
            })
        }

        fn reauthentication_url(&self) -> Result<String, AuthError> {
            Ok("https://idp.test/oauth2/authorize".into())
        }
    }

    fn refresher(fail: bool) -> Arc<CountingRefresher> {
        Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn expired() -> TokenSet {
        TokenSet {
            access_token: "stale".into(),
            refresh_token: Some("r1".into()),
            expires_at: OffsetDateTime::now_utc() - Duration::minutes(1),
            scope: None,
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let r = refresher(false);
        let mut tokens = expired();
        tokens.expires_at = OffsetDateTime::now_utc() + Duration::hours(1);
        let cache = TokenCache::with_tokens(r.clone(), tokens);

        assert_eq!(cache.access_token().await.unwrap(), "stale");
        assert_eq!(r.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let r = refresher(false);
        let cache = Arc::new(TokenCache::with_tokens(r.clone(), expired()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.access_token().await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "fresh-1");
        }
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_clears_cache() {
        let r = refresher(true);
        let cache = TokenCache::with_tokens(r.clone(), expired());

        match cache.access_token().await {
            Err(AuthError::ReauthenticationRequired { redirect_url }) => {
                assert_eq!(redirect_url, "https://idp.test/oauth2/authorize")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(cache.current().await.is_none());

        // Nothing left to refresh with
        assert!(matches!(
            cache.access_token().await,
            Err(AuthError::ReauthenticationRequired { .. })
        ));
        assert_eq!(r.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_cache_requires_sign_in() {
        let cache = TokenCache::new(refresher(false));
        assert!(matches!(
            cache.access_token().await,
            Err(AuthError::ReauthenticationRequired { .. })
        ));
    }
}
