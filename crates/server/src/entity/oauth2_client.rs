//! OAuth2 Client entity - registered applications and their allowlists.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Human-readable client name
    pub name: String,
    /// Client secret (None for public clients)
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub require_client_secret: bool,
    /// Space-separated list of allowed grant types
    pub grant_types: String,
    pub require_pkce: bool,
    pub allow_plain_text_pkce: bool,
    /// JSON array of allowed redirect URIs
    pub redirect_uris: String,
    /// JSON array of allowed post-logout redirect URIs
    pub post_logout_redirect_uris: String,
    /// Space-separated list of allowed scopes
    pub allowed_scopes: String,
    /// JSON array of origins allowed to call the token endpoint cross-origin
    pub allowed_cors_origins: String,
    pub require_consent: bool,
    /// Whether refresh tokens may be issued (`offline_access`)
    pub allow_offline_access: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse redirect URIs from JSON string
    pub fn redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.redirect_uris).unwrap_or_default()
    }

    pub fn post_logout_redirect_uris_list(&self) -> Vec<String> {
        serde_json::from_str(&self.post_logout_redirect_uris).unwrap_or_default()
    }

    pub fn cors_origins_list(&self) -> Vec<String> {
        serde_json::from_str(&self.allowed_cors_origins).unwrap_or_default()
    }

    /// Parse grant types from space-separated string
    pub fn grant_types_list(&self) -> Vec<String> {
        self.grant_types
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Parse scopes from space-separated string
    pub fn scopes_list(&self) -> Vec<String> {
        self.allowed_scopes
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Exact string match against the registered redirect URIs.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    pub fn is_post_logout_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris_list()
            .iter()
            .any(|allowed| allowed == uri)
    }

    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        self.allowed_scopes.split_whitespace().any(|s| s == scope)
    }

    /// Check if a grant type is allowed for this client
    pub fn is_grant_type_allowed(&self, grant_type: &str) -> bool {
        self.grant_types_list().iter().any(|g| g == grant_type)
    }

    pub fn is_public(&self) -> bool {
        !self.require_client_secret
    }
}
