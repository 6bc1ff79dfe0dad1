//! OAuth2 state management.

use crate::config::AppConfig;
use crate::entity::{identity_user, oauth2_authorization, oauth2_token};
use crate::error::OAuthError;
use crate::oauth2::password::generate_token;
use crate::oauth2::request::ValidatedAuthorization;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

/// How long a consent screen stays answerable.
pub const CONSENT_LIFETIME: Duration = Duration::minutes(10);

/// An authenticated request waiting for the user's consent decision.
#[derive(Debug, Clone)]
pub struct PendingConsent {
    pub user_id: String,
    pub user_name: String,
    pub authorization: ValidatedAuthorization,
    pub expires_at: OffsetDateTime,
}

impl PendingConsent {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    /// Base URL for the OAuth2 server, without trailing slash
    pub issuer_url: String,
    pub access_token_lifetime: i64,
    pub refresh_token_lifetime: i64,
    pub authorization_code_lifetime: i64,
    consents: Arc<Mutex<HashMap<String, PendingConsent>>>,
}

impl OAuth2State {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        Self {
            db,
            issuer_url: config.issuer().to_string(),
            access_token_lifetime: config.oauth2.access_token_lifetime,
            refresh_token_lifetime: config.oauth2.refresh_token_lifetime,
            authorization_code_lifetime: config.oauth2.authorization_code_lifetime,
            consents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Persist a single-use authorization code bound to the validated request and user.
    #[tracing::instrument(skip(self, authorization), fields(client_id = %authorization.client.id))]
    pub async fn issue_authorization_code(
        &self,
        authorization: &ValidatedAuthorization,
        user_id: &str,
    ) -> Result<String, OAuthError> {
        let code = generate_token()?;
        let now = OffsetDateTime::now_utc();

        oauth2_authorization::ActiveModel {
            code: Set(code.clone()),
            client_id: Set(authorization.client.id.clone()),
            user_id: Set(user_id.to_string()),
            redirect_uri: Set(authorization.redirect_uri.clone()),
            scope: Set(authorization.scope.clone()),
            nonce: Set(authorization.nonce.clone()),
            code_challenge: Set(authorization.code_challenge.clone()),
            code_challenge_method: Set(authorization
                .code_challenge_method
                .map(|m| m.as_str().to_string())),
            expires_at: Set(now + Duration::seconds(self.authorization_code_lifetime)),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        Ok(code)
    }

    /// Update user's last login time
    pub async fn update_last_login(&self, user_id: &str) -> Result<(), sea_orm::DbErr> {
        if let Some(user) = identity_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
        {
            let mut active: identity_user::ActiveModel = user.into();
            active.last_login_at = Set(Some(OffsetDateTime::now_utc()));
            active.update(self.db.as_ref()).await?;
        }
        Ok(())
    }

    /// Park an authenticated request until the user approves or denies it.
    pub async fn store_consent(
        &self,
        user: &identity_user::Model,
        authorization: ValidatedAuthorization,
    ) -> Result<String, OAuthError> {
        let handle = generate_token()?;
        let mut consents = self.consents.lock().await;
        consents.retain(|_, pending| !pending.is_expired());
        consents.insert(
            handle.clone(),
            PendingConsent {
                user_id: user.id.clone(),
                user_name: user.user_name.clone(),
                authorization,
                expires_at: OffsetDateTime::now_utc() + CONSENT_LIFETIME,
            },
        );
        Ok(handle)
    }

    /// Look at a pending consent without consuming it.
    pub async fn peek_consent(&self, handle: &str) -> Option<PendingConsent> {
        let consents = self.consents.lock().await;
        consents
            .get(handle)
            .filter(|pending| !pending.is_expired())
            .cloned()
    }

    /// Remove and return a pending consent. Each handle is answerable once.
    pub async fn take_consent(&self, handle: &str) -> Option<PendingConsent> {
        let mut consents = self.consents.lock().await;
        consents
            .remove(handle)
            .filter(|pending| !pending.is_expired())
    }
}

/// Delete expired authorization codes and tokens whose refresh window (or, without a refresh
/// token, access window) has passed. Returns the number of rows removed.
#[tracing::instrument(skip(db))]
pub async fn purge_expired(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let now = OffsetDateTime::now_utc();

    let codes = oauth2_authorization::Entity::delete_many()
        .filter(oauth2_authorization::Column::ExpiresAt.lt(now))
        .exec(db)
        .await?;

    let tokens = oauth2_token::Entity::delete_many()
        .filter(
            Condition::any()
                .add(oauth2_token::Column::RefreshTokenExpiresAt.lt(now))
                .add(
                    Condition::all()
                        .add(oauth2_token::Column::RefreshTokenExpiresAt.is_null())
                        .add(oauth2_token::Column::AccessTokenExpiresAt.lt(now)),
                ),
        )
        .exec(db)
        .await?;

    Ok(codes.rows_affected + tokens.rows_affected)
}
