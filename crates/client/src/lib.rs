//! Client side of the OIDC relationship: PKCE sign-in against the identity provider and
//! per-destination bearer token attachment for calls to the forecast API.

pub mod auth;
pub mod config;
pub mod error;
pub mod transport;
pub mod services;

pub use error::AuthError;
