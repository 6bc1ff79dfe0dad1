use config::Config;
use identity_provider::config::{AppConfig, ConfigError, SmtpConfig, load_config_from};
use std::env;
use std::fs;

fn write_temp_config(name: &str, content: &str) -> std::path::PathBuf {
    let path = env::temp_dir().join(format!("{name}-{}.yaml", std::process::id()));
    fs::write(&path, content).expect("Failed to write temp config");
    path
}

#[test]
fn test_smtp_config_deserialization() {
    let yaml_content = r#"
server: "smtp.example.com"
port: 587
username: "user@example.com"
password: "secret123"
from: "noreply@example.com"
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            yaml_content,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    let smtp_config: SmtpConfig = config
        .try_deserialize()
        .expect("Failed to deserialize SMTP config");
    assert_eq!(smtp_config.server, "smtp.example.com");
    assert_eq!(smtp_config.port, 587);
    assert_eq!(smtp_config.from, "noreply@example.com");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let path = write_temp_config(
        "minimal",
        r#"
connection_strings:
  user_db_context_connection: "sqlite::memory:"
issuer_url: "https://localhost:5001/"
"#,
    );

    let app_config = load_config_from(path.to_str().unwrap()).expect("valid config");
    let _ = fs::remove_file(path);

    assert_eq!(app_config.listen_addr, "0.0.0.0:5001");
    assert_eq!(app_config.oauth2.access_token_lifetime, 3600);
    assert_eq!(app_config.oauth2.refresh_token_lifetime, 2_592_000);
    assert_eq!(app_config.oauth2.authorization_code_lifetime, 300);
    assert!(app_config.seed.enabled);
    assert!(app_config.smtp.is_none());
    assert_eq!(app_config.issuer(), "https://localhost:5001");
}

#[test]
fn test_full_config() {
    let path = write_temp_config(
        "full",
        r#"
connection_strings:
  user_db_context_connection: "postgres://idp:secret@db/identity"
issuer_url: "https://id.example.com"
listen_addr: "127.0.0.1:8443"
oauth2:
  access_token_lifetime: 600
seed:
  enabled: false
smtp:
  server: "smtp.example.com"
  port: 587
  username: "user"
  password: "secret"
  from: "noreply@example.com"
"#,
    );

    let app_config = load_config_from(path.to_str().unwrap()).expect("valid config");
    let _ = fs::remove_file(path);

    assert_eq!(
        app_config.connection_strings.user_db_context_connection,
        "postgres://idp:secret@db/identity"
    );
    assert_eq!(app_config.listen_addr, "127.0.0.1:8443");
    assert_eq!(app_config.oauth2.access_token_lifetime, 600);
    assert_eq!(app_config.oauth2.authorization_code_lifetime, 300);
    assert!(!app_config.seed.enabled);
    assert_eq!(app_config.smtp.unwrap().port, 587);
}

#[test]
fn test_invalid_lifetime_is_rejected() {
    let path = write_temp_config(
        "zero-lifetime",
        r#"
connection_strings:
  user_db_context_connection: "sqlite::memory:"
issuer_url: "https://localhost:5001"
oauth2:
  authorization_code_lifetime: 0
"#,
    );

    let result = load_config_from(path.to_str().unwrap());
    let _ = fs::remove_file(path);

    match result {
        Err(ConfigError::Validation(msg)) => assert!(msg.contains("authorization_code_lifetime")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_huge_lifetime_is_rejected() {
    let path = write_temp_config(
        "huge-lifetime",
        r#"
connection_strings:
  user_db_context_connection: "sqlite::memory:"
issuer_url: "https://localhost:5001"
oauth2:
  refresh_token_lifetime: 9223372036854775807
"#,
    );

    let result = load_config_from(path.to_str().unwrap());
    let _ = fs::remove_file(path);

    match result {
        Err(ConfigError::Validation(msg)) => assert!(msg.contains("refresh_token_lifetime")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_invalid_issuer_is_rejected() {
    let path = write_temp_config(
        "bad-issuer",
        r#"
connection_strings:
  user_db_context_connection: "sqlite::memory:"
issuer_url: "not a url"
"#,
    );

    let result = load_config_from(path.to_str().unwrap());
    let _ = fs::remove_file(path);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_config_with_environment_variables() {
    let path = write_temp_config(
        "env-override",
        r#"
connection_strings:
  user_db_context_connection: "sqlite://file.db"
issuer_url: "https://file.example.com"
"#,
    );

    unsafe {
        env::set_var(
            "IDPTEST__CONNECTION_STRINGS__USER_DB_CONTEXT_CONNECTION",
            "postgres://env/test",
        );
    }

    let config = Config::builder()
        .add_source(config::File::from(path.clone()))
        .add_source(config::Environment::with_prefix("IDPTEST").separator("__"))
        .build()
        .expect("Failed to build config");
    let app_config: AppConfig = config.try_deserialize().expect("Failed to deserialize");

    unsafe {
        env::remove_var("IDPTEST__CONNECTION_STRINGS__USER_DB_CONTEXT_CONNECTION");
    }
    let _ = fs::remove_file(path);

    // Environment variables override file values
    assert_eq!(
        app_config.connection_strings.user_db_context_connection,
        "postgres://env/test"
    );
    assert_eq!(app_config.issuer_url, "https://file.example.com");
}

#[test]
fn test_load_config_missing_file() {
    let path = env::temp_dir().join("definitely-missing-identity-config.yaml");
    let result = load_config_from(path.to_str().unwrap());
    assert!(matches!(result, Err(ConfigError::Build(_))));
}

#[test]
fn test_config_partial_structure() {
    let invalid_yaml = r#"
issuer_url: "https://localhost:5001"
# Missing connection_strings
"#;

    let config = Config::builder()
        .add_source(config::File::from_str(
            invalid_yaml,
            config::FileFormat::Yaml,
        ))
        .build()
        .expect("Failed to build config");

    let result: Result<AppConfig, _> = config.try_deserialize();
    assert!(
        result.is_err(),
        "Should fail when required fields are missing"
    );
}
