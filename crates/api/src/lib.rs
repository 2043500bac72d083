//! SketchFlow API server library.
//!
//! Exposes the building blocks (config, state, session registry, job
//! orchestrator, push channels, background tasks, routes) so integration
//! tests and the binary entrypoint can both access them.

pub mod background;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod templates;
pub mod ws;
