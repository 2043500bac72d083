use crate::job::JobState;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Session limit reached ({capacity} active sessions)")]
    AdmissionRejected { capacity: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Failed to submit workflow: {0}")]
    EngineSubmitFailed(String),

    #[error("Generation failed: {0}")]
    EngineReportedError(String),

    #[error("No result: {0}")]
    ResultMissing(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Illegal job transition: {from:?} -> {to:?}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error("Internal error: {0}")]
    Internal(String),
}
