//! Generation job execution.
//!
//! Contains the orchestrator that runs one single-flight job per session
//! against the ComfyUI engine and streams progress and the terminal outcome
//! back over the session's push channel.

pub mod orchestrator;

pub use orchestrator::JobOrchestrator;

/// Public URL of a session's stored result.
pub fn result_url(session_id: &str) -> String {
    format!("/api/result/{session_id}")
}
