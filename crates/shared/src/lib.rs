//! Types shared by the identity provider, the forecast API and the client.

use serde::{Deserialize, Serialize};
use time::Date;

/// Scope (and API resource name) guarding the forecast API.
pub const FORECAST_API_SCOPE: &str = "blazorOIDCApi";

/// Relative path of the forecast endpoint, resolved against the API base address.
pub const FORECAST_PATH: &str = "WeatherForecast";

/// A single forecast record as served by `GET /WeatherForecast`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Date))]
    pub date: Date,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: Option<String>,
}

impl WeatherForecast {
    pub fn new(date: Date, temperature_c: i32, summary: Option<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit(temperature_c),
            summary,
        }
    }
}

/// Celsius to Fahrenheit, truncated the way the forecast API has always reported it.
pub fn fahrenheit(celsius: i32) -> i32 {
    32 + (celsius as f64 / 0.5556) as i32
}
