use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

/// Connection string of the user store as configured for the identity provider.
fn configured_database_url() -> Option<String> {
    Config::builder()
        .add_source(config::File::with_name("config.yaml").required(false))
        .add_source(config::Environment::default().separator("__"))
        .build()
        .ok()?
        .get_string("connection_strings.user_db_context_connection")
        .ok()
}

#[tokio::main]
async fn main() {
    // DATABASE_URL (or --database-url) wins over the provider configuration
    if env::var("DATABASE_URL").is_err()
        && let Some(url) = configured_database_url()
    {
        // SAFETY: nothing else reads the environment before the CLI starts
        unsafe { env::set_var("DATABASE_URL", url) };
    }
    cli::run_cli(migration::Migrator).await;
}
