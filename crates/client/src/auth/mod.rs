mod attach;
mod cache;
mod oidc;
mod token;

pub use attach::{AuthorizedUrls, AuthorizingClient, matches_prefix};
pub use cache::{AccessTokenProvider, TokenCache, TokenRefresher};
pub use oidc::{OidcClient, ProviderMetadata, code_challenge};
pub use token::{EXPIRY_SKEW, TokenResponse, TokenSet};
