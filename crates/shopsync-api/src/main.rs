mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use shopsync_core::shop::HttpShopTransport;
use shopsync_core::{DatabaseService, SyncOrchestrator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shopsync_api=info".parse().expect("valid directive"))
                .add_directive("shopsync_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting shopsync-api with config: {:?}", config);

    let db = DatabaseService::open_path(config.engine.db_path.clone()).await?;
    let orchestrator = SyncOrchestrator::new(db, HttpShopTransport::new()?)
        .with_retry_policy(config.engine.retry_policy())
        .with_job_timeout(config.engine.job_timeout());

    let state = AppState::new(config, orchestrator);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("shopsync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
