//! Identity user entity - accounts that can sign in at the identity provider.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "identity_user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub user_name: String,
    pub email: String,
    pub email_confirmed: bool,
    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub email_confirmation_token: Option<String>,
    pub email_confirmation_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::identity_user_claim::Entity")]
    Claims,
}

impl Related<super::identity_user_claim::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Claims.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True while a confirmation link is outstanding and still usable.
    pub fn has_pending_confirmation(&self) -> bool {
        match (
            &self.email_confirmation_token,
            self.email_confirmation_expires_at,
        ) {
            (Some(_), Some(expires_at)) => expires_at > OffsetDateTime::now_utc(),
            _ => false,
        }
    }

    pub fn is_confirmation_expired(&self) -> bool {
        match self.email_confirmation_expires_at {
            Some(expires_at) => expires_at <= OffsetDateTime::now_utc(),
            None => true,
        }
    }
}
