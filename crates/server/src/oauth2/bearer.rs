//! Bearer token validation shared by `userinfo` and the protected API.

use crate::entity::oauth2_token;
use crate::error::OAuthError;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use time::OffsetDateTime;

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("Bearer"))
        .map(|(_, token)| token.trim())
        .filter(|t| !t.is_empty())
}

/// Look up the presented access token; it must exist, be unrevoked and unexpired.
pub async fn authenticate(
    db: &DatabaseConnection,
    headers: &HeaderMap,
) -> Result<oauth2_token::Model, OAuthError> {
    let access_token = bearer_token(headers).ok_or_else(|| {
        OAuthError::InvalidToken("Missing or invalid Authorization header".into())
    })?;

    let token = oauth2_token::Entity::find()
        .filter(oauth2_token::Column::AccessToken.eq(access_token))
        .one(db)
        .await?
        .ok_or_else(|| OAuthError::InvalidToken(String::new()))?;

    if token.is_revoked() {
        return Err(OAuthError::InvalidToken("Token has been revoked".into()));
    }
    if token.access_expired_at(OffsetDateTime::now_utc()) {
        return Err(OAuthError::InvalidToken("Token has expired".into()));
    }
    Ok(token)
}

/// Require a granted scope.
pub fn require_scope(token: &oauth2_token::Model, scope: &str) -> Result<(), OAuthError> {
    if !token.has_scope(scope) {
        return Err(OAuthError::InsufficientScope(format!(
            "Token does not have '{scope}' scope"
        )));
    }
    Ok(())
}

/// Require that the token was issued for the given API resource.
pub fn require_audience(token: &oauth2_token::Model, audience: &str) -> Result<(), OAuthError> {
    if !token.has_audience(audience) {
        return Err(OAuthError::InsufficientScope(format!(
            "Token was not issued for audience '{audience}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        for value in ["BEARER abc123", "bEaReR abc123", "bearer abc123"] {
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(bearer_token(&headers), Some("abc123"), "{value}");
        }
    }

    #[test]
    fn ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearerabc123"));
        assert_eq!(bearer_token(&headers), None);
    }
}
