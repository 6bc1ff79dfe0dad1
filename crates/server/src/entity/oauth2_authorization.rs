//! OAuth2 Authorization Code entity - single-use codes exchanged for tokens.

use crate::oauth2::pkce::CodeChallengeMethod;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_authorization")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    /// OpenID Connect nonce
    pub nonce: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (S256 or plain)
    pub code_challenge_method: Option<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if this authorization code has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    /// Verify a PKCE code verifier against the stored challenge.
    ///
    /// A code issued without a challenge accepts no verifier; an unknown stored
    /// method never verifies.
    pub fn verify_pkce(&self, code_verifier: Option<&str>) -> bool {
        match (&self.code_challenge, code_verifier) {
            (Some(challenge), Some(verifier)) => {
                let method = match self.code_challenge_method.as_deref() {
                    Some(m) => match m.parse::<CodeChallengeMethod>() {
                        Ok(method) => method,
                        Err(_) => return false,
                    },
                    None => CodeChallengeMethod::Plain,
                };
                method.verify(verifier, challenge)
            }
            (None, None) => true,
            _ => false,
        }
    }
}
