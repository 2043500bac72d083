use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::session::Session;
use crate::ws::manager::{ChannelManager, Liveness};

/// Spawn the liveness task for one attached channel.
///
/// Every check interval the task compares the session's last heartbeat with
/// the timeout. It exits once the channel is closed for silence, replaced by
/// a newer connection, detached, or the session is retired.
pub fn start_liveness(
    manager: Arc<ChannelManager>,
    session: Arc<Session>,
    conn_id: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(manager.heartbeat_check_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = session.retired().cancelled() => break,
                _ = interval.tick() => {}
            }

            match manager.check_liveness(&session, &conn_id).await {
                Liveness::Alive => {
                    tracing::trace!(session_id = session.id(), conn_id = %conn_id, "Channel alive");
                }
                Liveness::Stale | Liveness::Detached => break,
            }
        }

        tracing::debug!(session_id = session.id(), conn_id = %conn_id, "Liveness task stopped");
    })
}
