//! # lamdis-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the Lamdis action gateway.

use lamdis_api::config::GatewayConfig;
use lamdis_api::state::AppState;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();

    // Database pool is optional: absent means dev mode.
    let pool = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .min_connections(2)
                .acquire_timeout(std::time::Duration::from_secs(5))
                .connect(url)
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, "database connection failed");
                    err
                })?;
            tracing::info!("connected to PostgreSQL");
            Some(pool)
        }
        None => None,
    };

    let addr = config.http_addr.clone();
    let state = AppState::new(config, pool)?;
    let app = lamdis_api::app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("lamdis gateway listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
