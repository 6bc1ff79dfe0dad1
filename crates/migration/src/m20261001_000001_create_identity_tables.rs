//! Creates the user store:
//! - identity_user: accounts with Argon2 password hashes and email confirmation state
//! - identity_user_claim: identity claims (name, given_name, ...) attached to a user

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdentityUser::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityUser::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::UserName)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IdentityUser::Email).string().not_null())
                    .col(
                        ColumnDef::new(IdentityUser::EmailConfirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(IdentityUser::PasswordHash).string().null())
                    .col(
                        ColumnDef::new(IdentityUser::EmailConfirmationToken)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::EmailConfirmationExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUser::LastLoginAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_identity_user_email")
                    .table(IdentityUser::Table)
                    .col(IdentityUser::Email)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentityUserClaim::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityUserClaim::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserClaim::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserClaim::ClaimType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityUserClaim::ClaimValue)
                            .string()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_identity_user_claim_user")
                            .from(IdentityUserClaim::Table, IdentityUserClaim::UserId)
                            .to(IdentityUser::Table, IdentityUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_identity_user_claim_user_id")
                    .table(IdentityUserClaim::Table)
                    .col(IdentityUserClaim::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IdentityUserClaim::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityUser::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum IdentityUser {
    Table,
    Id,
    UserName,
    Email,
    EmailConfirmed,
    PasswordHash,
    EmailConfirmationToken,
    EmailConfirmationExpiresAt,
    CreatedAt,
    LastLoginAt,
}

#[derive(DeriveIden)]
enum IdentityUserClaim {
    Table,
    Id,
    UserId,
    ClaimType,
    ClaimValue,
}
