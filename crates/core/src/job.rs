//! Generation job state machine.
//!
//! A session runs at most one job at a time. The job moves through
//! `Idle -> Submitting -> Polling -> {Completed | Failed} -> Idle`; a
//! submission failure may jump straight from `Submitting` to `Failed`.
//! [`JobState::advance`] is the only way to move between states, so an
//! illegal transition surfaces as [`CoreError::IllegalTransition`] instead of
//! silently corrupting the session.

use serde::Serialize;

use crate::error::CoreError;

/// Current phase of a session's generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job in flight; a trigger may start one.
    #[default]
    Idle,
    /// Rendering the workflow and waiting for the engine to accept it.
    Submitting,
    /// The engine accepted the job and it is being polled.
    Polling,
    /// The job finished and its result was stored.
    Completed,
    /// The job finished without a usable result.
    Failed,
}

impl JobState {
    /// Whether a job currently occupies the session.
    pub fn is_busy(self) -> bool {
        !matches!(self, JobState::Idle)
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(self, next: JobState) -> Result<JobState, CoreError> {
        use JobState::*;

        let allowed = matches!(
            (self, next),
            (Idle, Submitting)
                | (Submitting, Polling)
                | (Submitting, Failed)
                | (Polling, Completed)
                | (Polling, Failed)
                | (Completed, Idle)
                | (Failed, Idle)
        );

        if allowed {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The result asset was stored at this path.
    Completed(std::path::PathBuf),
    /// The job failed; the message is shown to the client verbatim.
    Failed(String),
}

impl JobOutcome {
    /// The state the job lands in for this outcome.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}
