// crates/server/src/main.rs
//! Burntop server binary.
//!
//! Loads config from the environment, opens the database, starts the
//! background jobs (leaderboard minutely, benchmarks hourly), and serves
//! the API until ctrl-c.

use std::net::SocketAddr;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use burntop_db::Database;
use burntop_server::{create_app, jobs, AppState, Config};

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let db = if config.database_path.as_os_str() == ":memory:" {
        Database::new_in_memory().await?
    } else {
        Database::new_with_pool_size(&config.database_path, config.database_pool_size).await?
    };

    let port = config.port;
    let state = AppState::new(db, config);

    // Warm the pricing catalog before the first sync lands; failures
    // degrade to cache/empty and must not block startup.
    let pricing = state.pricing.clone();
    tokio::spawn(async move {
        let catalog = pricing.get().await;
        tracing::info!(models = catalog.len(), "Pricing catalog warmed");
    });

    jobs::spawn(state.clone());

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("burntop v{} listening on {addr}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
