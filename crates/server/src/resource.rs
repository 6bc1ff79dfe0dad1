//! The protected forecast API.

use crate::AppResources;
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::bearer;
use axum::{Extension, Json, http::HeaderMap};
use oidc_shared::{FORECAST_API_SCOPE, WeatherForecast};
use time::{Duration, OffsetDateTime};
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for the forecast API
pub const FORECAST_TAG: &str = "Forecast";

const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

const FORECAST_DAYS: i64 = 5;
const MIN_TEMPERATURE_C: i32 = -20;
const MAX_TEMPERATURE_C: i32 = 55;

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(get_forecast))
}

#[tracing::instrument(skip(resources, headers))]
#[utoipa::path(
    get,
    path = "/WeatherForecast",
    tag = FORECAST_TAG,
    operation_id = "Get Weather Forecast",
    summary = "Five day weather forecast",
    description = "Returns forecasts for the next five days. Requires a bearer access token issued \
                   for the `blazorOIDCApi` scope.",
    responses(
        (status = 200, description = "Forecast records", body = Vec<WeatherForecast>),
        (status = 401, description = "Missing, unknown, revoked or expired token", body = ErrorResponse),
        (status = 403, description = "Token lacks the API scope", body = ErrorResponse),
    ),
    security(("OAuth2" = ["blazorOIDCApi"]), ("Authorization" = []))
)]
pub async fn get_forecast(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
) -> Result<Json<Vec<WeatherForecast>>, OAuthError> {
    let token = bearer::authenticate(resources.db.as_ref(), &headers).await?;
    bearer::require_scope(&token, FORECAST_API_SCOPE)?;
    bearer::require_audience(&token, FORECAST_API_SCOPE)?;

    tracing::debug!(user_id = %token.user_id, client_id = %token.client_id, "Serving forecast");
    Ok(Json(generate_forecast(OffsetDateTime::now_utc())?))
}

/// Forecasts for the days following `now`.
pub fn generate_forecast(now: OffsetDateTime) -> Result<Vec<WeatherForecast>, getrandom::Error> {
    let today = now.date();
    (1..=FORECAST_DAYS)
        .map(|offset| {
            let temperature_c = random_in_range(MIN_TEMPERATURE_C, MAX_TEMPERATURE_C)?;
            let summary = SUMMARIES[getrandom::u32()? as usize % SUMMARIES.len()];
            Ok(WeatherForecast::new(
                today + Duration::days(offset),
                temperature_c,
                Some(summary.to_string()),
            ))
        })
        .collect()
}

/// Uniform-enough integer in `[min, max)`.
fn random_in_range(min: i32, max: i32) -> Result<i32, getrandom::Error> {
    let span = (max - min) as u32;
    Ok(min + (getrandom::u32()? % span) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn five_consecutive_days_starting_tomorrow() {
        let now = datetime!(2026-10-16 12:00 UTC);
        let forecast = generate_forecast(now).unwrap();

        assert_eq!(forecast.len(), 5);
        for (i, day) in forecast.iter().enumerate() {
            assert_eq!(day.date, now.date() + Duration::days(i as i64 + 1));
            assert!((MIN_TEMPERATURE_C..MAX_TEMPERATURE_C).contains(&day.temperature_c));
            assert_eq!(day.temperature_f, oidc_shared::fahrenheit(day.temperature_c));
            let summary = day.summary.as_deref().unwrap();
            assert!(SUMMARIES.iter().any(|s| *s == summary));
        }
    }
}
