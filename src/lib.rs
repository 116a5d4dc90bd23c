pub mod api;
pub mod config;
pub mod core;
pub mod log;
pub mod providers;
pub mod scheduler;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::core::MarketData;

pub async fn run(config: AppConfig) -> Result<()> {
    info!("MoneyWatch backend starting...");
    debug!("Resolved config: {config:#?}");

    let registry = providers::build_registry(&config)?;
    let directory = Arc::new(providers::catalog::FundCatalog::new(
        &config.endpoints.suggest,
        &config.endpoints.catalog,
    )?);
    let market = Arc::new(MarketData::new(
        registry,
        directory,
        Duration::from_secs(config.estimate_ttl_secs),
        Duration::from_secs(config.nav_ttl_secs),
    ));

    scheduler::start(Arc::clone(&market), config.watch_codes.clone());

    let router = api::app_router(market, &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
