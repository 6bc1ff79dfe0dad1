use thiserror::Error;

/// Boxed transport error, as returned by [`crate::transport::HttpClient`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable token; the user has to sign in again at `redirect_url`.
    #[error("Re-authentication required: {redirect_url}")]
    ReauthenticationRequired { redirect_url: String },
    #[error("Token refresh failed: {0}")]
    Refresh(String),
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),
    #[error("HTTP {status}: {body}")]
    Http { status: http::StatusCode, body: String },
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The callback state does not match a pending authorization request")]
    StateMismatch,
    /// The provider answered the authorization request with an error.
    #[error("Authorization failed: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Authorization {
        error: String,
        description: Option<String>,
    },
    #[error("Token lifetime out of range: expires_in={0}")]
    InvalidExpiry(i64),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to build request: {0}")]
    Request(#[from] http::Error),
    #[error("Failed to generate random value: {0}")]
    Random(#[from] getrandom::Error),
}

impl AuthError {
    pub fn transport(e: impl Into<BoxError>) -> Self {
        Self::Transport(e.into())
    }
}
