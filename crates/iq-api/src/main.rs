//! Intent query API server.
//!
//! Answers free-text questions about inventory, production-line and
//! lab-test records through the rule-driven resolver.

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use iq_api::config::ApiConfig;
use iq_api::db;
use iq_api::routes;
use iq_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "iq-api starting");

    let config = ApiConfig::from_env()?;

    // Connect to PostgreSQL if DATABASE_URL is set, otherwise use in-memory state.
    let state = if let Some(database_url) = &config.database_url {
        tracing::info!("connecting to PostgreSQL");
        let pool = db::connect(database_url).await?;
        AppState::with_pool(pool, &config).await?
    } else {
        tracing::warn!("DATABASE_URL not set, using in-memory state with sample data");
        AppState::in_memory(&config).await?
    };

    let app = routes::build_router(state);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
