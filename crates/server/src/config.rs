use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Named connection strings. Only the user store is needed.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionStrings {
    pub user_db_context_connection: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Token and code lifetimes, in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
    #[serde(default = "default_authorization_code_lifetime")]
    pub authorization_code_lifetime: i64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            authorization_code_lifetime: default_authorization_code_lifetime(),
        }
    }
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30
}

fn default_authorization_code_lifetime() -> i64 {
    300
}

#[derive(Clone, Debug, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub connection_strings: ConnectionStrings,
    /// Public base URL of this server; used as issuer and to build absolute links.
    pub issuer_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub seed: SeedConfig,
    /// Without SMTP settings outgoing mail is discarded.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5001".to_string()
}

/// Upper bound for any configured lifetime (ten years).
pub const MAX_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_strings.user_db_context_connection.is_empty() {
            return Err(ConfigError::Validation(
                "connection_strings.user_db_context_connection must be set".into(),
            ));
        }
        if url::Url::parse(&self.issuer_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "issuer_url is not a valid URL: {}",
                self.issuer_url
            )));
        }
        let lifetimes = [
            ("oauth2.access_token_lifetime", self.oauth2.access_token_lifetime),
            ("oauth2.refresh_token_lifetime", self.oauth2.refresh_token_lifetime),
            (
                "oauth2.authorization_code_lifetime",
                self.oauth2.authorization_code_lifetime,
            ),
        ];
        for (key, value) in lifetimes {
            if value <= 0 {
                return Err(ConfigError::Validation(format!("{key} must be > 0")));
            }
            if value > MAX_LIFETIME_SECONDS {
                return Err(ConfigError::Validation(format!(
                    "{key} must be at most {MAX_LIFETIME_SECONDS} seconds"
                )));
            }
        }
        if let Some(smtp) = &self.smtp
            && smtp.port == 0
        {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        Ok(())
    }

    /// Issuer without a trailing slash, for joining endpoint paths.
    pub fn issuer(&self) -> &str {
        self.issuer_url.trim_end_matches('/')
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path separated by
/// double underscores (e.g. `CONNECTION_STRINGS__USER_DB_CONTEXT_CONNECTION`) overrides
/// the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            connection_strings: ConnectionStrings {
                user_db_context_connection: "sqlite::memory:".into(),
            },
            issuer_url: "https://localhost:5001/".into(),
            listen_addr: default_listen_addr(),
            oauth2: OAuth2Config::default(),
            seed: SeedConfig::default(),
            smtp: None,
        }
    }

    #[test]
    fn issuer_trims_trailing_slash() {
        assert_eq!(base().issuer(), "https://localhost:5001");
    }

    #[test]
    fn rejects_zero_lifetime() {
        let mut cfg = base();
        cfg.oauth2.authorization_code_lifetime = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("authorization_code_lifetime"));
    }

    #[test]
    fn rejects_lifetime_beyond_cap() {
        let mut cfg = base();
        cfg.oauth2.access_token_lifetime = MAX_LIFETIME_SECONDS;
        assert!(cfg.validate().is_ok());
        cfg.oauth2.access_token_lifetime = i64::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));
    }

    #[test]
    fn rejects_unparseable_issuer() {
        let mut cfg = base();
        cfg.issuer_url = "not a url".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_smtp_port_zero() {
        let mut cfg = base();
        cfg.smtp = Some(SmtpConfig {
            server: "localhost".into(),
            port: 0,
            username: "u".into(),
            password: "p".into(),
            from: "noreply@example.org".into(),
        });
        assert!(cfg.validate().is_err());
    }
}
