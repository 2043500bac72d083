//! Push-channel frame types.
//!
//! Clients send JSON text frames tagged by `"type"`; the server replies
//! with status frames tagged by `"status"` plus a `"type"`-tagged heartbeat
//! acknowledgement. Client frames are a closed set: anything else is an
//! [`CoreError::InvalidFrame`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Frames accepted from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keep-alive; answered with [`ServerFrame::HeartbeatAck`].
    Heartbeat,
    /// A new revision of the sketch, raw base64 or a `data:image/...` URI.
    SketchUpdate { sketch_data: String },
    /// A rendered result handed back directly by the client.
    ImageResult { image_data: String },
}

/// Parse an inbound text frame.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, CoreError> {
    serde_json::from_str(text).map_err(|e| CoreError::InvalidFrame(e.to_string()))
}

/// Frames pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Status(StatusFrame),
    HeartbeatAck(HeartbeatAck),
}

/// Job status updates, tagged by `"status"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusFrame {
    Processing { progress: f64 },
    Completed { result_url: String },
    Error { message: String },
}

/// `{"type": "heartbeat_ack"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeartbeatAck {
    HeartbeatAck,
}

impl ServerFrame {
    pub fn processing(progress: f64) -> Self {
        Self::Status(StatusFrame::Processing { progress })
    }

    pub fn completed(result_url: impl Into<String>) -> Self {
        Self::Status(StatusFrame::Completed {
            result_url: result_url.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Status(StatusFrame::Error {
            message: message.into(),
        })
    }

    pub fn heartbeat_ack() -> Self {
        Self::HeartbeatAck(HeartbeatAck::HeartbeatAck)
    }

    /// Serialize to the JSON text sent over the wire.
    pub fn to_json(&self) -> String {
        // Every variant is a plain struct of strings and floats.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
