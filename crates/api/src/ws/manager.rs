use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use sketchflow_core::frames::ServerFrame;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::session::{Session, SessionRegistry};
use crate::ws::ChannelHandle;

/// Everything a connection needs after [`ChannelManager::attach`].
pub struct Attachment {
    pub conn_id: String,
    /// Outbound messages to forward to the WebSocket sink.
    pub receiver: mpsc::UnboundedReceiver<Message>,
    /// Fires when the server closes this channel (replacement, heartbeat
    /// timeout, session retirement or shutdown).
    pub closed: CancellationToken,
}

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Heartbeats are arriving.
    Alive,
    /// Heartbeat silence exceeded the timeout; the channel was closed.
    Stale,
    /// The channel was already replaced or detached.
    Detached,
}

/// Attaches push channels to sessions and keeps them honest.
///
/// The channel handle itself lives in the session, so a session can never
/// point at more than one connection; this type owns the rules for
/// replacing, detaching and timing out those handles.
pub struct ChannelManager {
    registry: Arc<SessionRegistry>,
    heartbeat_check_interval: Duration,
    heartbeat_timeout: Duration,
}

impl ChannelManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        heartbeat_check_interval: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            heartbeat_check_interval,
            heartbeat_timeout,
        }
    }

    pub fn heartbeat_check_interval(&self) -> Duration {
        self.heartbeat_check_interval
    }

    /// Attach a new connection to `session`, replacing any previous one.
    ///
    /// The previous connection is told to close and its sender is dropped,
    /// so nothing addressed to the session can reach it afterwards.
    pub async fn attach(&self, session: &Session) -> Attachment {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = session.retired().child_token();

        let mut state = session.state().await;
        let handle = ChannelHandle::new(conn_id.clone(), tx, closed.clone());
        if let Some(previous) = state.channel.replace(handle) {
            tracing::debug!(
                session_id = session.id(),
                old_conn_id = previous.conn_id(),
                conn_id = %conn_id,
                "Replacing push channel",
            );
            previous.close("Replaced by a newer connection");
        }
        state.alive = true;
        state.last_heartbeat = Instant::now();
        state.last_update = chrono::Utc::now();

        Attachment {
            conn_id,
            receiver: rx,
            closed,
        }
    }

    /// Clear the session's channel if it still belongs to `conn_id`.
    ///
    /// Returns `false` when a newer connection already took over.
    pub async fn detach(&self, session: &Session, conn_id: &str) -> bool {
        let mut state = session.state().await;
        let owned = state
            .channel
            .as_ref()
            .is_some_and(|channel| channel.conn_id() == conn_id);
        if owned {
            state.channel = None;
            state.alive = false;
        }
        owned
    }

    /// Stamp a heartbeat and acknowledge it.
    ///
    /// Heartbeats keep the channel open but do not count as session
    /// activity, so an idle client still expires.
    pub async fn record_heartbeat(&self, session: &Session) {
        let mut state = session.state().await;
        state.last_heartbeat = Instant::now();
        state.alive = true;
        if let Some(channel) = &state.channel {
            if let Err(e) = channel.send_frame(&ServerFrame::heartbeat_ack()) {
                tracing::debug!(session_id = session.id(), error = %e, "Heartbeat ack not sent");
            }
        }
    }

    /// Deliver a frame to the session with `session_id`. Unknown sessions
    /// and missing channels are a no-op.
    pub async fn deliver(&self, session_id: &str, frame: &ServerFrame) -> bool {
        match self.registry.get(session_id).await {
            Some(session) => session.deliver(frame).await,
            None => false,
        }
    }

    /// Close the channel `conn_id` if its heartbeat went silent for longer
    /// than the timeout. The session itself is kept so a later reconnect can
    /// resume it.
    pub async fn check_liveness(&self, session: &Session, conn_id: &str) -> Liveness {
        let mut state = session.state().await;
        match &state.channel {
            Some(channel) if channel.conn_id() == conn_id => {}
            _ => return Liveness::Detached,
        }

        let silence = state.last_heartbeat.elapsed();
        if silence <= self.heartbeat_timeout {
            return Liveness::Alive;
        }

        if let Some(channel) = state.channel.take() {
            channel.close("Heartbeat timeout");
        }
        state.alive = false;
        tracing::info!(
            session_id = session.id(),
            conn_id,
            silence_secs = silence.as_secs(),
            "Push channel closed after heartbeat timeout",
        );
        Liveness::Stale
    }

    /// Number of sessions with an attached channel.
    pub async fn connection_count(&self) -> usize {
        let mut count = 0;
        for session in self.registry.sessions().await {
            if session.state().await.channel.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Close every channel and drain the registry.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops.
    pub async fn shutdown_all(&self) {
        let count = self.registry.shutdown().await;
        tracing::info!(count, "Closed all push channels");
    }
}
