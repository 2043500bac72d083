//! Background tasks spawned at server startup.

pub mod resource_guard;
pub mod session_sweeper;
