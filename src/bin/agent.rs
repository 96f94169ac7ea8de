//! Asset Agent Service - Binary Entry Point
//!
//! Accepts ad-hoc events over HTTP and publishes a periodic system snapshot
//! for this node.

use std::sync::Arc;

use tracing::info;

use asset_events::api::{agent_router, AgentState};
use asset_events::broker::{AmqpBroker, Broker};
use asset_events::config::PipelineConfig;
use asset_events::logging::init_logging;
use asset_events::producer::{EventPublisher, ShellSnapshotSource, SnapshotPublisher};
use asset_events::shutdown;
use asset_events::types::AppResult;

#[tokio::main]
async fn main() -> AppResult<()> {
    init_logging();

    let config = PipelineConfig::from_env()?;
    info!(
        broker = %config.broker.redacted_uri(),
        queue = %config.queue,
        node_id = %config.node_id,
        "starting asset agent"
    );

    let shutdown_rx = shutdown::install_handler()?;

    let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(&config.broker));
    let publisher = EventPublisher::from_config(broker, &config);

    let snapshots = SnapshotPublisher::from_config(
        publisher.clone(),
        Arc::new(ShellSnapshotSource::new(config.node_id.clone())),
        &config,
    );
    let periodic = tokio::spawn(snapshots.run(shutdown_rx.clone()));

    let state = Arc::new(AgentState::new(publisher, config.node_id.clone()));
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "agent listening");

    axum::serve(listener, agent_router(state))
        .with_graceful_shutdown(shutdown::wait_for(shutdown_rx))
        .await?;

    periodic.await?;
    info!("asset agent stopped");
    Ok(())
}
