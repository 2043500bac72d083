use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use sketchflow_core::error::CoreError;
use sketchflow_core::frames::ServerFrame;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Close code sent when a channel is shut down by the server (1001, going away).
const CLOSE_GOING_AWAY: u16 = 1001;

/// Handle to the live push channel of one session.
///
/// The session keeps exactly one of these. Replacing or clearing it drops
/// the sender, which lets the connection's writer task drain and exit.
#[derive(Debug)]
pub struct ChannelHandle {
    conn_id: String,
    sender: WsSender,
    /// Cancelled to make the connection's reader loop stop.
    closed: CancellationToken,
}

impl ChannelHandle {
    pub fn new(conn_id: String, sender: WsSender, closed: CancellationToken) -> Self {
        Self {
            conn_id,
            sender,
            closed,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Queue a frame for the client. Fails with [`CoreError::ChannelClosed`]
    /// once the connection's writer is gone.
    pub fn send_frame(&self, frame: &ServerFrame) -> Result<(), CoreError> {
        self.sender
            .send(Message::Text(frame.to_json().into()))
            .map_err(|_| CoreError::ChannelClosed)
    }

    /// Queue a Close frame and stop the connection's reader loop.
    pub fn close(&self, reason: &'static str) {
        let _ = self.sender.send(Message::Close(Some(CloseFrame {
            code: CLOSE_GOING_AWAY,
            reason: Utf8Bytes::from_static(reason),
        })));
        self.closed.cancel();
    }
}
