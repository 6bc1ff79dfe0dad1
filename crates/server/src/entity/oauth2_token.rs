//! Issued access tokens, each optionally paired with a refresh token.
//!
//! Tokens are opaque random strings; validation is a lookup, not a signature check.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub access_token: String,
    #[sea_orm(unique)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub client_id: String,
    pub user_id: String,
    /// Granted scopes, space separated
    pub scope: String,
    /// API resources the token was issued for, space separated
    pub audience: String,
    pub access_token_expires_at: OffsetDateTime,
    pub refresh_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn access_expired_at(&self, now: OffsetDateTime) -> bool {
        self.access_token_expires_at <= now
    }

    /// A token without a refresh token can never be refreshed.
    pub fn refreshable_at(&self, now: OffsetDateTime) -> bool {
        !self.is_revoked() && self.refresh_token_expires_at.is_some_and(|exp| exp > now)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.split_whitespace().any(|s| s == scope)
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.audience.split_whitespace().any(|a| a == audience)
    }
}
