//! HTTP surface of the identity provider.
//!
//! - `oauth2` routes under `/oauth2` plus discovery at `/.well-known/openid-configuration`
//! - the protected forecast API at `/WeatherForecast`
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration, served as Redoc at `/api-docs`

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::AppResources;
use crate::catalog;
use crate::entity::oauth2_client;
use crate::oauth2::{self, OAuth2State};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use sea_orm::{DatabaseConnection, EntityTrait};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Build the complete application router.
///
/// The CORS allowlist is read from the registered clients once, so clients should be seeded
/// before the router is built. An unreadable registry falls back to the static catalog.
#[tracing::instrument(skip(resources))]
pub async fn build_router(resources: AppResources) -> Router {
    let oauth2_state = OAuth2State::new(resources.db.clone(), &resources.config);
    let cors = cors_layer(&cors_origins(resources.db.as_ref()).await);

    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth2", oauth2::router().with_state(oauth2_state.clone()))
        .merge(oauth2::endpoints::discovery_router().with_state(oauth2_state))
        .merge(crate::resource::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(resources))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Origins registered by clients in the database, or by the static catalog when the
/// registry cannot be read (e.g. after a failed migration).
async fn cors_origins(db: &DatabaseConnection) -> Vec<String> {
    match oauth2_client::Entity::find().all(db).await {
        Ok(clients) => clients.iter().flat_map(|c| c.cors_origins_list()).collect(),
        Err(e) => {
            tracing::error!("Client registry unavailable, using built-in CORS origins: {}", e);
            catalog::CLIENTS
                .iter()
                .flat_map(|c| c.allowed_cors_origins.iter().map(|o| o.to_string()))
                .collect()
        }
    }
}

/// CORS restricted to the given origins.
fn cors_layer(allowed: &[String]) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in allowed {
        match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }
    tracing::info!(count = origins.len(), "Configured CORS origins");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let router = build_router(resources).await;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
