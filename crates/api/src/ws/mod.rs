//! WebSocket push channels.
//!
//! Provides the per-session channel handle, the manager that attaches and
//! detaches channels, the liveness task, and the HTTP upgrade handler used
//! by Axum routes.

mod channel;
mod handler;
mod heartbeat;
pub mod manager;

pub use channel::{ChannelHandle, WsSender};
pub use handler::ws_handler;
pub use heartbeat::start_liveness;
pub use manager::{Attachment, ChannelManager, Liveness};
