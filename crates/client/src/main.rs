use color_eyre::eyre::WrapErr;
use oidc_client::auth::{
    AccessTokenProvider, AuthorizedUrls, AuthorizingClient, OidcClient, TokenCache,
};
use oidc_client::config::load_config;
use oidc_client::services::WeatherForecastService;
use oidc_client::transport::HyperClient;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "oidc_client=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn read_line() -> color_eyre::eyre::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .wrap_err("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    initialize_tracing();

    let config = load_config().wrap_err("Failed to load appsettings")?;
    let http = HyperClient::new().wrap_err("Failed to set up TLS")?;

    let oidc = Arc::new(
        OidcClient::discover(http.clone(), config.oidc_configuration.clone())
            .await
            .wrap_err("Failed to load the provider's discovery document")?,
    );

    let authorize_url = oidc.begin_authorization()?;
    println!("Open this URL in a browser and sign in:\n\n  {authorize_url}\n");
    println!("Then paste the full URL you were redirected to:");
    let callback = read_line().await?;

    let tokens = oidc
        .complete_authorization(&callback)
        .await
        .wrap_err("Sign-in failed")?;
    tracing::info!(scope = ?tokens.scope, "Signed in");

    let cache: Arc<dyn AccessTokenProvider> =
        Arc::new(TokenCache::with_tokens(oidc.clone(), tokens));
    let urls = AuthorizedUrls::new()
        .with(config.authorized_prefix()?, cache.clone())
        .with(config.api_base()?, cache);
    let client = Arc::new(AuthorizingClient::new(http, urls));

    let service = WeatherForecastService::new(client, config.api_base()?);
    let forecasts = service
        .get_forecasts()
        .await
        .wrap_err("Failed to fetch forecasts")?;

    println!("{:<12} {:>6} {:>6}  Summary", "Date", "Temp C", "Temp F");
    for forecast in &forecasts {
        println!(
            "{:<12} {:>6} {:>6}  {}",
            forecast.date,
            forecast.temperature_c,
            forecast.temperature_f,
            forecast.summary.as_deref().unwrap_or("")
        );
    }

    println!("\nTo sign out, open:\n\n  {}", oidc.end_session_url(None)?);
    Ok(())
}
