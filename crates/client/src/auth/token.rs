use serde::Deserialize;
use time::{Duration, OffsetDateTime};

use crate::error::AuthError;

/// Tokens are treated as expired this long before their actual expiry.
pub const EXPIRY_SKEW: Duration = Duration::seconds(30);

/// Body of a successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The tokens held for one signed-in session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: OffsetDateTime,
    pub scope: Option<String>,
}

impl TokenSet {
    pub fn from_response(
        response: TokenResponse,
        received_at: OffsetDateTime,
    ) -> Result<Self, AuthError> {
        let expires_at = received_at
            .checked_add(Duration::seconds(response.expires_in))
            .ok_or(AuthError::InvalidExpiry(response.expires_in))?;
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            scope: response.scope,
        })
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now + EXPIRY_SKEW >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
