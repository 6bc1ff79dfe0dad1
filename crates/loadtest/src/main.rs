use goose::prelude::*;
use std::env;

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

async fn get_discovery_document(user: &mut GooseUser) -> TransactionResult {
    let mut goose = user.get("/.well-known/openid-configuration").await?;
    if let Ok(response) = goose.response {
        match response.json::<serde_json::Value>().await {
            Ok(document) if document["issuer"].is_string() => {}
            Ok(_) => {
                return user.set_failure(
                    "discovery document has no issuer",
                    &mut goose.request,
                    None,
                    None,
                );
            }
            Err(_) => {
                return user.set_failure(
                    "discovery document is not JSON",
                    &mut goose.request,
                    None,
                    None,
                );
            }
        }
    }
    Ok(())
}

/// The forecast API must reject anonymous callers; a 401 counts as success here.
async fn get_forecast_unauthenticated(user: &mut GooseUser) -> TransactionResult {
    let request_builder = user.get_request_builder(&GooseMethod::Get, "/WeatherForecast")?;
    let goose_request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .expect_status_code(401)
        .build();
    let _goose_metrics = user.request(goose_request).await?;
    Ok(())
}

async fn get_authorize_redirect(user: &mut GooseUser) -> TransactionResult {
    let client_id = env::var("CLIENT_ID").unwrap_or_else(|_| "blazorOIDC".to_string());
    let redirect_uri = env::var("REDIRECT_URI")
        .unwrap_or_else(|_| "https://localhost:5000/authentication/login-callback".to_string());
    let path = format!(
        "/oauth2/authorize?response_type=code&client_id={client_id}&redirect_uri={redirect_uri}&scope=openid&code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM&code_challenge_method=S256"
    );
    let request_builder = user.get_request_builder(&GooseMethod::Get, &path)?;
    let goose_request = GooseRequest::builder()
        .set_request_builder(request_builder)
        .expect_status_code(303)
        .build();
    let _goose_metrics = user.request(goose_request).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    println!(
        "Client used for authorize calls: {}",
        env::var("CLIENT_ID").unwrap_or_else(|_| "blazorOIDC".to_string())
    );

    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Discovery").register_transaction(transaction!(get_discovery_document)),
        )
        .register_scenario(
            scenario!("AuthorizationFlow")
                .register_transaction(transaction!(get_authorize_redirect))
                .register_transaction(transaction!(get_forecast_unauthenticated)),
        )
        .execute()
        .await?;

    Ok(())
}
