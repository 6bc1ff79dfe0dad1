//! SeaORM entities for the user store and the authorization server.

pub mod identity_user;
pub mod identity_user_claim;
pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_token;
