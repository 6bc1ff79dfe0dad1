//! Static resource and client catalog.
//!
//! Identity resources map scopes to the user claims they release, API scopes map to the
//! audience that accepts them, and the client list is upserted into `oauth2_client` at
//! startup.

use oidc_shared::FORECAST_API_SCOPE;

#[derive(Debug, Clone, Copy)]
pub struct IdentityResource {
    pub name: &'static str,
    pub display_name: &'static str,
    pub claims: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct ApiScope {
    pub name: &'static str,
    pub display_name: &'static str,
}

/// An API resource is the audience a set of API scopes is issued for.
#[derive(Debug, Clone, Copy)]
pub struct ApiResource {
    pub name: &'static str,
    pub display_name: &'static str,
    pub scopes: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct ClientDefinition {
    pub client_id: &'static str,
    pub client_name: &'static str,
    pub grant_types: &'static [&'static str],
    pub require_client_secret: bool,
    pub require_pkce: bool,
    pub allow_plain_text_pkce: bool,
    pub redirect_uris: &'static [&'static str],
    pub post_logout_redirect_uris: &'static [&'static str],
    pub allowed_scopes: &'static [&'static str],
    pub allowed_cors_origins: &'static [&'static str],
    pub require_consent: bool,
    pub allow_offline_access: bool,
}

pub const OPENID_SCOPE: &str = "openid";
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

pub static IDENTITY_RESOURCES: &[IdentityResource] = &[
    IdentityResource {
        name: OPENID_SCOPE,
        display_name: "Your user identifier",
        claims: &["sub"],
    },
    IdentityResource {
        name: "profile",
        display_name: "User profile",
        claims: &["name", "given_name", "family_name"],
    },
    IdentityResource {
        name: "email",
        display_name: "Your email address",
        claims: &["email", "email_verified"],
    },
];

pub static API_SCOPES: &[ApiScope] = &[ApiScope {
    name: FORECAST_API_SCOPE,
    display_name: "Blazor OIDC API",
}];

pub static API_RESOURCES: &[ApiResource] = &[ApiResource {
    name: FORECAST_API_SCOPE,
    display_name: "Blazor OIDC API",
    scopes: &[FORECAST_API_SCOPE],
}];

pub static CLIENTS: &[ClientDefinition] = &[ClientDefinition {
    client_id: "blazorOIDC",
    client_name: "Blazor OIDC",
    grant_types: &["authorization_code"],
    require_client_secret: false,
    require_pkce: true,
    allow_plain_text_pkce: false,
    redirect_uris: &["https://localhost:5000/authentication/login-callback"],
    post_logout_redirect_uris: &["https://localhost:5000/authentication/logout-callback"],
    allowed_scopes: &["openid", "profile", "email", FORECAST_API_SCOPE],
    allowed_cors_origins: &["https://localhost:5000"],
    require_consent: false,
    allow_offline_access: false,
}];

pub fn identity_resource(name: &str) -> Option<&'static IdentityResource> {
    IDENTITY_RESOURCES.iter().find(|r| r.name == name)
}

pub fn api_scope(name: &str) -> Option<&'static ApiScope> {
    API_SCOPES.iter().find(|s| s.name == name)
}

/// Claim types released by the given set of granted scopes.
pub fn claims_for_scopes<'a>(scopes: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let mut claims = Vec::new();
    for scope in scopes {
        if let Some(resource) = identity_resource(scope) {
            for claim in resource.claims {
                if !claims.contains(claim) {
                    claims.push(*claim);
                }
            }
        }
    }
    claims
}

/// Audiences (API resource names) that accept at least one of the granted scopes.
pub fn audiences_for_scopes<'a>(scopes: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let scopes: Vec<&str> = scopes.into_iter().collect();
    API_RESOURCES
        .iter()
        .filter(|r| r.scopes.iter().any(|s| scopes.contains(s)))
        .map(|r| r.name)
        .collect()
}

/// Every scope name the provider knows about.
pub fn supported_scopes() -> Vec<&'static str> {
    IDENTITY_RESOURCES
        .iter()
        .map(|r| r.name)
        .chain(API_SCOPES.iter().map(|s| s.name))
        .chain(std::iter::once(OFFLINE_ACCESS_SCOPE))
        .collect()
}

/// Human-readable label for a scope, used on the login and consent pages.
pub fn scope_display_name(scope: &str) -> String {
    if let Some(resource) = identity_resource(scope) {
        return resource.display_name.to_string();
    }
    if let Some(api) = api_scope(scope) {
        return api.display_name.to_string();
    }
    if scope == OFFLINE_ACCESS_SCOPE {
        return "Offline access".to_string();
    }
    scope.to_string()
}
