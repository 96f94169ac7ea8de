//! Asset Collector Service - Binary Entry Point
//!
//! Consumes the event queue into the in-memory aggregate and serves the query
//! surface over HTTP.

use std::sync::Arc;

use tracing::info;

use asset_events::api::{collector_router, CollectorState};
use asset_events::broker::{AmqpBroker, Broker};
use asset_events::config::PipelineConfig;
use asset_events::consumer::{BackoffPolicy, ConnectionManager, ConsumerSettings};
use asset_events::logging::init_logging;
use asset_events::types::AppResult;
use asset_events::{shutdown, Aggregator};

#[tokio::main]
async fn main() -> AppResult<()> {
    init_logging();

    // Configuration errors are the only fatal startup errors
    let config = PipelineConfig::from_env()?;
    info!(
        broker = %config.broker.redacted_uri(),
        queue = %config.queue,
        prefetch = config.prefetch,
        retention = config.retention_capacity,
        "starting asset collector"
    );

    let shutdown_rx = shutdown::install_handler()?;

    let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(&config.broker));
    let aggregator = Aggregator::new(config.retention_capacity);
    let query = aggregator.query();

    let manager = ConnectionManager::new(
        broker,
        ConsumerSettings::from_config(&config),
        BackoffPolicy::from_config(&config),
        aggregator,
    );
    let state = Arc::new(CollectorState::new(query, manager.status()));
    let consumer = tokio::spawn(manager.run(shutdown_rx.clone()));

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "collector listening");

    axum::serve(listener, collector_router(state))
        .with_graceful_shutdown(shutdown::wait_for(shutdown_rx))
        .await?;

    consumer.await?;
    info!("asset collector stopped");
    Ok(())
}
