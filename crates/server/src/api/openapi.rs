//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::catalog;
use crate::oauth2::OAUTH2_TAG;
use crate::resource::FORECAST_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Opaque access token from the token endpoint
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Use an access token obtained from the `/oauth2/token` endpoint.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));

            let scopes = catalog::supported_scopes()
                .into_iter()
                .map(|scope| (scope.to_string(), catalog::scope_display_name(scope)));
            let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
                "/oauth2/authorize",
                "/oauth2/token",
                Scopes::from_iter(scopes),
            ))]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Identity Provider API",
        version = "1.0.0",
        description = "OpenID Connect identity provider and the forecast API it protects."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and OpenID Connect endpoints"),
        (name = FORECAST_TAG, description = "Protected forecast API")
    )
)]
pub struct ApiDoc;
