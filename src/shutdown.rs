//! Process shutdown signal
//!
//! Ctrl-C and SIGTERM flip a `watch` flag that every long-running task
//! (HTTP server, consumer, snapshot publisher) listens on.

use tokio::sync::watch;

/// Install the signal handler and return the shutdown flag
pub fn install_handler() -> Result<watch::Receiver<bool>, ctrlc::Error> {
    let (tx, rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        tx.send_replace(true);
    })?;
    Ok(rx)
}

/// Resolve once the flag is set (or its sender is gone)
pub async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
