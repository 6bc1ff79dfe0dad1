//! Idempotent seeding of the user store and the client registry.

use crate::catalog::{CLIENTS, ClientDefinition};
use crate::entity::{identity_user, identity_user_claim, oauth2_client};
use crate::error::SeedError;
use crate::oauth2::password::{hash_password, validate_password_policy};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use time::OffsetDateTime;

/// A user created at startup when missing.
#[derive(Debug, Clone, Copy)]
pub struct SeedUser {
    pub given_name: &'static str,
    pub family_name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
}

pub static SEED_USERS: &[SeedUser] = &[
    SeedUser {
        given_name: "Jack",
        family_name: "Torrance",
        email: "jack.torrance@email.com",
        password: "P@ssword1",
    },
    SeedUser {
        given_name: "Wendy",
        family_name: "Torrance",
        email: "wendy.torrance@email.com",
        password: "P@ssword1",
    },
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub existing: usize,
}

/// Create each seed user unless one with the same user name already exists.
///
/// The user name of a seed user is its given name, so two seed users sharing a given name
/// collapse into the first.
#[tracing::instrument(skip_all)]
pub async fn seed_users(
    db: &DatabaseConnection,
    users: &[SeedUser],
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    for user in users {
        if seed_user(db, user).await? {
            report.created += 1;
        } else {
            report.existing += 1;
        }
    }
    tracing::info!(
        created = report.created,
        existing = report.existing,
        "Seed users checked"
    );
    Ok(report)
}

/// Returns `true` when the user was created.
async fn seed_user(db: &DatabaseConnection, seed: &SeedUser) -> Result<bool, SeedError> {
    let existing = identity_user::Entity::find()
        .filter(identity_user::Column::UserName.eq(seed.given_name))
        .one(db)
        .await?;
    if existing.is_some() {
        tracing::debug!(user_name = seed.given_name, "Seed user already exists");
        return Ok(false);
    }

    validate_password_policy(seed.password).map_err(|e| SeedError::UserCreation(e.to_string()))?;
    let password_hash =
        hash_password(seed.password).map_err(|e| SeedError::UserCreation(e.to_string()))?;

    let user_id = uuid::Uuid::new_v4().to_string();
    let txn = db.begin().await?;

    identity_user::ActiveModel {
        id: Set(user_id.clone()),
        user_name: Set(seed.given_name.to_string()),
        email: Set(seed.email.to_string()),
        email_confirmed: Set(true),
        password_hash: Set(Some(password_hash)),
        email_confirmation_token: Set(None),
        email_confirmation_expires_at: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
        last_login_at: Set(None),
    }
    .insert(&txn)
    .await?;

    let full_name = format!("{} {}", seed.given_name, seed.family_name);
    let claims = [
        ("name", full_name.as_str()),
        ("given_name", seed.given_name),
        ("family_name", seed.family_name),
        ("email", seed.email),
    ];
    identity_user_claim::Entity::insert_many(claims.iter().map(|(claim_type, value)| {
        identity_user_claim::ActiveModel {
            user_id: Set(user_id.clone()),
            claim_type: Set((*claim_type).to_string()),
            claim_value: Set((*value).to_string()),
            ..Default::default()
        }
    }))
    .exec(&txn)
    .await?;

    txn.commit().await?;
    tracing::info!(user_name = seed.given_name, "Seed user created");
    Ok(true)
}

/// Upsert the static client catalog into `oauth2_client`, keyed by client id.
#[tracing::instrument(skip_all)]
pub async fn seed_clients(
    db: &DatabaseConnection,
    clients: &[ClientDefinition],
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();
    let now = OffsetDateTime::now_utc();
    for client in clients {
        let existing = oauth2_client::Entity::find_by_id(client.client_id)
            .one(db)
            .await?;
        let mut active = client_active_model(client, now);
        match existing {
            Some(model) => {
                active.created_at = Set(model.created_at);
                active.update(db).await?;
                report.existing += 1;
            }
            None => {
                active.insert(db).await?;
                report.created += 1;
            }
        }
    }
    tracing::info!(
        created = report.created,
        updated = report.existing,
        "Client registry synchronised"
    );
    Ok(report)
}

fn client_active_model(client: &ClientDefinition, now: OffsetDateTime) -> oauth2_client::ActiveModel {
    let json = |values: &[&str]| serde_json::to_string(values).unwrap_or_else(|_| "[]".into());
    oauth2_client::ActiveModel {
        id: Set(client.client_id.to_string()),
        name: Set(client.client_name.to_string()),
        secret: Set(None),
        require_client_secret: Set(client.require_client_secret),
        grant_types: Set(client.grant_types.join(" ")),
        require_pkce: Set(client.require_pkce),
        allow_plain_text_pkce: Set(client.allow_plain_text_pkce),
        redirect_uris: Set(json(client.redirect_uris)),
        post_logout_redirect_uris: Set(json(client.post_logout_redirect_uris)),
        allowed_scopes: Set(client.allowed_scopes.join(" ")),
        allowed_cors_origins: Set(json(client.allowed_cors_origins)),
        require_consent: Set(client.require_consent),
        allow_offline_access: Set(client.allow_offline_access),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// Seed the client catalog and the fixed users.
pub async fn run(db: &DatabaseConnection) -> Result<(), SeedError> {
    seed_clients(db, CLIENTS).await?;
    seed_users(db, SEED_USERS).await?;
    Ok(())
}

/// How far [`prepare_database`] got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Ready,
    /// Migrated, but seeding failed or is disabled.
    Unseeded,
    Unmigrated,
}

/// Apply migrations, then seed. Failures are logged, never returned: the server starts
/// either way.
#[tracing::instrument(skip(db))]
pub async fn prepare_database(db: &DatabaseConnection, seed_enabled: bool) -> DatabaseState {
    if let Err(e) = Migrator::up(db, None).await {
        tracing::error!("Database migration failed: {}", e);
        return DatabaseState::Unmigrated;
    }
    if !seed_enabled {
        tracing::info!("Seeding disabled");
        return DatabaseState::Unseeded;
    }
    match run(db).await {
        Ok(()) => DatabaseState::Ready,
        Err(e) => {
            tracing::error!("An error occurred seeding the DB: {}", e);
            DatabaseState::Unseeded
        }
    }
}
