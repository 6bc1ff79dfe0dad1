//! OpenID Connect identity provider with a protected forecast API.
//!
//! The provider authenticates seeded or self-registered users, issues single-use PKCE-bound
//! authorization codes and opaque access tokens to registered clients, and serves
//! `/WeatherForecast` to bearers of a token carrying the API scope.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::email::EmailSender;

pub mod api;
pub mod catalog;
pub mod config;
pub mod email;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod resource;
pub mod seed;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<dyn EmailSender>,
    pub config: Arc<AppConfig>,
}
