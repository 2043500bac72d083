//! Periodic removal of idle sessions.
//!
//! Spawns a background task that retires every session whose last activity
//! is older than the session timeout. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::session::SessionRegistry;

/// Run the expiry sweep loop until `cancel` is triggered.
pub async fn run(registry: Arc<SessionRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");

    let mut ticker = tokio::time::interval(interval);
    // Nothing can be expired at startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&registry).await;
            }
        }
    }
}

/// One sweep. Returns the number of sessions removed.
pub async fn sweep_once(registry: &SessionRegistry) -> usize {
    let removed = registry.sweep_expired(Utc::now()).await;
    if removed.is_empty() {
        tracing::debug!("Session sweep: nothing expired");
    }
    for session_id in &removed {
        tracing::info!(session_id = %session_id, "Session swept");
    }
    removed.len()
}
