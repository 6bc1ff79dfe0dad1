use color_eyre::eyre::WrapErr;
use identity_provider::AppResources;
use identity_provider::api::start_webserver;
use identity_provider::config::load_config;
use identity_provider::email::{EmailSender, FakeEmailSender, SmtpEmailSender};
use identity_provider::oauth2::state::purge_expired;
use identity_provider::seed::prepare_database;
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "identity_provider=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // .env is optional
    let _ = dotenvy::dotenv();

    initialize_tracing();

    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e).wrap_err("Failed to load configuration");
        }
    };

    let ring_provider = crypto::ring::default_provider();
    if CryptoProvider::install_default(ring_provider).is_err() {
        tracing::debug!("A crypto provider was already installed");
    }

    let db = Arc::new(
        Database::connect(&config.connection_strings.user_db_context_connection)
            .await
            .wrap_err("Failed to connect to database")?,
    );

    let state = prepare_database(db.as_ref(), config.seed.enabled).await;
    tracing::info!(?state, "Database prepared");

    let mailer: Arc<dyn EmailSender> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp).wrap_err("Invalid SMTP settings")?),
        None => {
            tracing::info!("No SMTP configured, confirmation emails are discarded");
            Arc::new(FakeEmailSender)
        }
    };

    // Periodically drop expired codes and tokens
    {
        let db = db.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                match purge_expired(db.as_ref()).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Purged expired grants"),
                    Err(e) => tracing::warn!("Failed to purge expired grants: {}", e),
                }
            }
        });
    }

    let resources = AppResources { db, mailer, config };
    if let Err(e) = start_webserver(resources).await {
        tracing::error!("Fatal server error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
