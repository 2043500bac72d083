//! Sessions and the registry that owns them.
//!
//! A [`Session`] is shared as `Arc<Session>` between the registry, the
//! WebSocket connection serving it, its liveness task and its job task.
//! Its mutable fields live behind a per-session mutex so work on unrelated
//! sessions never contends. The session also owns a cancellation token:
//! once the registry retires the session the token fires, job tasks abort,
//! and every later write-back is a no-op.

mod registry;

pub use registry::SessionRegistry;

use std::path::PathBuf;

use sketchflow_core::error::CoreError;
use sketchflow_core::frames::ServerFrame;
use sketchflow_core::job::{JobOutcome, JobState};
use sketchflow_core::types::{SessionId, Timestamp};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ws::ChannelHandle;

/// Per-client state for one sketch-to-image conversation.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
}

/// Mutable fields of a [`Session`], guarded by the session lock.
#[derive(Debug)]
pub struct SessionState {
    /// Validated style selector.
    pub style: String,
    /// Latest sketch revision on disk.
    pub sketch_path: Option<PathBuf>,
    /// Latest stored result.
    pub result_path: Option<PathBuf>,
    pub job: JobState,
    /// A trigger arrived while a job was in flight.
    pub needs_reprocess: bool,
    /// Engine prompt id of the in-flight job, once submitted.
    pub active_prompt: Option<String>,
    /// Last client activity; drives expiry.
    pub last_update: Timestamp,
    /// Last heartbeat on the push channel; drives channel liveness.
    pub last_heartbeat: Instant,
    pub alive: bool,
    /// The most recent push channel, if connected.
    pub channel: Option<ChannelHandle>,
    /// Every file written for this session.
    pub artifacts: Vec<PathBuf>,
}

impl SessionState {
    fn new(style: String) -> Self {
        Self {
            style,
            sketch_path: None,
            result_path: None,
            job: JobState::Idle,
            needs_reprocess: false,
            active_prompt: None,
            last_update: chrono::Utc::now(),
            last_heartbeat: Instant::now(),
            alive: false,
            channel: None,
            artifacts: Vec::new(),
        }
    }

    /// Compare-and-set out of `Idle`.
    ///
    /// Returns `true` if the caller now owns the job. A trigger that loses
    /// the race leaves `needs_reprocess` set so the running job picks up the
    /// newer sketch when it finishes.
    pub fn begin_job(&mut self) -> bool {
        if self.sketch_path.is_none() {
            return false;
        }
        if self.job.is_busy() {
            self.needs_reprocess = true;
            return false;
        }
        match self.job.advance(JobState::Submitting) {
            Ok(next) => {
                self.job = next;
                self.needs_reprocess = false;
                true
            }
            Err(_) => false,
        }
    }

    /// Return to `Idle` after a terminal outcome. If another trigger arrived
    /// meanwhile, immediately claim the next job and return `true`.
    pub fn release_job(&mut self) -> bool {
        self.active_prompt = None;
        self.job = match self.job.advance(JobState::Idle) {
            Ok(idle) => idle,
            Err(e) => {
                tracing::error!(error = %e, "Releasing a job that never finished");
                JobState::Idle
            }
        };

        if self.needs_reprocess {
            return self.begin_job();
        }
        false
    }
}

impl Session {
    pub fn new(id: SessionId, style: String) -> Self {
        Self {
            id,
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::new(style)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lock the session's mutable fields.
    ///
    /// Never hold this guard across engine calls or while taking the
    /// registry lock.
    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Whether the registry has removed this session.
    pub fn is_retired(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token fired when the session is retired.
    pub fn retired(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A fresh token for one job, cancelled together with the session.
    pub fn job_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Point the session at a new sketch revision. Refused with
    /// `SessionNotFound` once the session is retired.
    pub async fn set_sketch(&self, path: PathBuf) -> Result<(), CoreError> {
        let mut state = self.state().await;
        if self.is_retired() {
            return Err(CoreError::SessionNotFound(self.id.clone()));
        }
        state.artifacts.push(path.clone());
        state.sketch_path = Some(path);
        state.last_update = chrono::Utc::now();
        Ok(())
    }

    /// Change the style used by the next job.
    pub async fn set_style(&self, style: String) {
        self.state().await.style = style;
    }

    /// Store a result that did not come from a job (client hand-back).
    pub async fn set_result(&self, path: PathBuf) -> Result<(), CoreError> {
        let mut state = self.state().await;
        if self.is_retired() {
            return Err(CoreError::SessionNotFound(self.id.clone()));
        }
        state.artifacts.push(path.clone());
        state.result_path = Some(path);
        state.last_update = chrono::Utc::now();
        Ok(())
    }

    /// Push a frame to the current channel. No channel, a closed channel or
    /// a retired session all make this a no-op; returns whether the frame was
    /// queued.
    pub async fn deliver(&self, frame: &ServerFrame) -> bool {
        let state = self.state().await;
        match &state.channel {
            Some(channel) if !self.is_retired() => channel.send_frame(frame).is_ok(),
            _ => false,
        }
    }

    // ---- job write-backs ----

    /// Snapshot of what the next job should render.
    pub async fn job_input(&self) -> Option<(PathBuf, String)> {
        let state = self.state().await;
        state
            .sketch_path
            .clone()
            .map(|sketch| (sketch, state.style.clone()))
    }

    /// `Submitting -> Polling` once the engine accepted the job.
    pub async fn mark_polling(&self, prompt_id: &str) -> Result<(), CoreError> {
        let mut state = self.state().await;
        if self.is_retired() {
            return Err(CoreError::SessionNotFound(self.id.clone()));
        }
        state.job = state.job.advance(JobState::Polling)?;
        state.active_prompt = Some(prompt_id.to_string());
        Ok(())
    }

    /// Move the job into its terminal state and, on success, store the
    /// result reference. Fails with `SessionNotFound` if the session was
    /// retired meanwhile; the caller drops the outcome.
    pub async fn complete_job(&self, outcome: &JobOutcome) -> Result<(), CoreError> {
        let mut state = self.state().await;
        if self.is_retired() {
            return Err(CoreError::SessionNotFound(self.id.clone()));
        }
        state.job = state.job.advance(outcome.state())?;
        if let JobOutcome::Completed(path) = outcome {
            state.artifacts.push(path.clone());
            state.result_path = Some(path.clone());
        }
        Ok(())
    }

    /// See [`SessionState::release_job`].
    pub async fn release_job(&self) -> bool {
        let mut state = self.state().await;
        if self.is_retired() {
            state.job = JobState::Idle;
            return false;
        }
        state.release_job()
    }

    /// Cancel in-flight work, close the channel, and hand back the artifacts
    /// for deletion. Called by the registry on removal.
    pub(crate) async fn retire(&self, reason: &'static str) -> Vec<PathBuf> {
        self.cancel.cancel();
        let mut state = self.state().await;
        if let Some(channel) = state.channel.take() {
            channel.close(reason);
        }
        state.alive = false;
        state.sketch_path = None;
        state.result_path = None;
        std::mem::take(&mut state.artifacts)
    }
}
