//! Client configuration, read from `appsettings.yaml` plus environment overrides.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Settings of the identity provider relationship.
#[derive(Clone, Debug, Deserialize)]
pub struct OidcConfiguration {
    /// Base URL of the identity provider
    pub authority: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    #[serde(default = "default_response_type")]
    pub response_type: String,
    #[serde(default = "default_scopes")]
    pub default_scopes: Vec<String>,
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string()]
}

impl OidcConfiguration {
    pub fn scope(&self) -> String {
        self.default_scopes.join(" ")
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    /// Destination prefix that receives the session's bearer token
    pub on_demand_courses_api_uri: String,
    /// Base address of the forecast API
    pub blazor_oidc_api: String,
    pub oidc_configuration: OidcConfiguration,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("on_demand_courses_api_uri", &self.on_demand_courses_api_uri),
            ("blazor_oidc_api", &self.blazor_oidc_api),
            ("oidc_configuration.authority", &self.oidc_configuration.authority),
            ("oidc_configuration.redirect_uri", &self.oidc_configuration.redirect_uri),
            (
                "oidc_configuration.post_logout_redirect_uri",
                &self.oidc_configuration.post_logout_redirect_uri,
            ),
        ];
        for (key, value) in urls {
            Url::parse(value)
                .map_err(|e| ConfigError::Validation(format!("{key} is not a valid URL: {e}")))?;
        }
        if self.oidc_configuration.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "oidc_configuration.client_id must be set".into(),
            ));
        }
        if self.oidc_configuration.response_type != "code" {
            return Err(ConfigError::Validation(format!(
                "oidc_configuration.response_type must be 'code', got '{}'",
                self.oidc_configuration.response_type
            )));
        }
        Ok(())
    }

    /// The forecast API base address as a URL that relative paths can be joined onto.
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        base_url(&self.blazor_oidc_api)
    }

    pub fn authorized_prefix(&self) -> Result<Url, ConfigError> {
        base_url(&self.on_demand_courses_api_uri)
    }
}

/// Parse a base address, making sure the path ends with `/`.
fn base_url(value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{value} is not a valid URL: {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from("appsettings.yaml")
}

pub fn load_config_from(path: &str) -> Result<ClientConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let client: ClientConfig = cfg.try_deserialize()?;
    client.validate()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
on_demand_courses_api_uri: "https://localhost:5002"
blazor_oidc_api: "https://localhost:5002/api"
oidc_configuration:
  authority: "https://localhost:5001"
  client_id: "blazorOIDC"
  redirect_uri: "https://localhost:5000/authentication/login-callback"
  post_logout_redirect_uri: "https://localhost:5000/authentication/logout-callback"
"#;

    fn parse(yaml: &str) -> ClientConfig {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn defaults_and_validation() {
        let config = parse(YAML);
        assert_eq!(config.oidc_configuration.response_type, "code");
        assert_eq!(config.oidc_configuration.scope(), "openid profile");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn base_addresses_get_a_trailing_slash() {
        let config = parse(YAML);
        assert_eq!(config.api_base().unwrap().as_str(), "https://localhost:5002/api/");
        assert_eq!(
            config
                .api_base()
                .unwrap()
                .join(oidc_shared::FORECAST_PATH)
                .unwrap()
                .as_str(),
            "https://localhost:5002/api/WeatherForecast"
        );
        assert_eq!(config.authorized_prefix().unwrap().as_str(), "https://localhost:5002/");
    }

    #[test]
    fn implicit_flow_is_rejected() {
        let mut config = parse(YAML);
        config.oidc_configuration.response_type = "token".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }
}
