//! Domain logic shared by the SketchFlow crates.
//!
//! Everything in here is pure (no I/O, no async runtime): the error
//! taxonomy, push-channel frame types, the generation job state machine,
//! progress accounting, workflow template rendering, input validation and
//! resource threshold evaluation.

pub mod error;
pub mod frames;
pub mod job;
pub mod payload;
pub mod progress;
pub mod resources;
pub mod types;
pub mod validation;
pub mod workflow;
