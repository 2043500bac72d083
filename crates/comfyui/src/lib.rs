//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper, typed history records, and the
//! [`engine::GenerationEngine`] trait the job orchestrator drives, so the
//! orchestrator can be exercised against an in-memory engine in tests.

pub mod api;
pub mod engine;
pub mod history;
