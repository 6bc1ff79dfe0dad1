use crate::auth::AuthorizingClient;
use crate::error::AuthError;
use crate::transport::HttpClient;
use http::{Method, Request, header};
use oidc_shared::{FORECAST_PATH, WeatherForecast};
use std::sync::Arc;
use url::Url;

/// Reads forecasts from the protected API.
pub struct WeatherForecastService<T> {
    client: Arc<AuthorizingClient<T>>,
    base: Url,
}

impl<T: HttpClient> WeatherForecastService<T> {
    /// `base` must end with `/` so that the forecast path is joined onto it.
    pub fn new(client: Arc<AuthorizingClient<T>>, base: Url) -> Self {
        Self { client, base }
    }

    pub fn forecast_url(&self) -> Result<Url, AuthError> {
        Ok(self.base.join(FORECAST_PATH)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_forecasts(&self) -> Result<Vec<WeatherForecast>, AuthError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(self.forecast_url()?.as_str())
            .header(header::ACCEPT, "application/json")
            .body(Vec::new())?;

        let response = self.client.send(request).await?;
        if !response.status().is_success() {
            return Err(AuthError::Http {
                status: response.status(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        let forecasts: Vec<WeatherForecast> = serde_json::from_slice(response.body())?;
        tracing::debug!(count = forecasts.len(), "Fetched forecasts");
        Ok(forecasts)
    }
}
