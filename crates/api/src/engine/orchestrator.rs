//! Single-flight generation jobs.
//!
//! [`JobOrchestrator::trigger`] claims the session's job slot and spawns a
//! task that renders the workflow, submits it, polls the engine's history
//! until it reports a terminal status, and stores the first output image.
//! A trigger that arrives while a job runs only marks the session for
//! reprocessing; the running task starts one follow-up job when it ends.
//! No automatic retry is performed on failure.

use std::sync::Arc;
use std::time::Duration;

use sketchflow_comfyui::engine::GenerationEngine;
use sketchflow_comfyui::history::ExecutionStatus;
use sketchflow_core::error::CoreError;
use sketchflow_core::frames::ServerFrame;
use sketchflow_core::job::JobOutcome;
use sketchflow_core::progress::ProgressAccumulator;
use tokio::time::MissedTickBehavior;

use crate::engine::result_url;
use crate::session::Session;
use crate::storage::ArtifactStore;
use crate::templates::WorkflowTemplates;

/// Runs generation jobs for sessions.
pub struct JobOrchestrator {
    engine: Arc<dyn GenerationEngine>,
    templates: WorkflowTemplates,
    store: ArtifactStore,
    poll_interval: Duration,
}

impl JobOrchestrator {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        templates: WorkflowTemplates,
        store: ArtifactStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            templates,
            store,
            poll_interval,
        }
    }

    /// Request a generation for the session's current sketch.
    ///
    /// Returns `true` if a new job task was spawned, `false` if a job was
    /// already running (it will reprocess when done), the session has no
    /// sketch, or the session is retired.
    pub async fn trigger(self: &Arc<Self>, session: &Arc<Session>) -> bool {
        if session.is_retired() {
            return false;
        }
        let claimed = session.state().await.begin_job();
        if !claimed {
            tracing::debug!(session_id = session.id(), "Job already running, marked for reprocess");
            return false;
        }

        tokio::spawn(Arc::clone(self).run(Arc::clone(session)));
        true
    }

    /// Job loop for one session. Runs jobs back to back while triggers keep
    /// arriving during execution.
    async fn run(self: Arc<Self>, session: Arc<Session>) {
        loop {
            let token = session.job_token();
            let generated = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                generated = self.generate(&session) => Some(generated),
            };

            let Some(generated) = generated else {
                self.abandon(&session).await;
                return;
            };

            let outcome = self.store_output(&session, generated).await;
            if let Err(e) = session.complete_job(&outcome).await {
                tracing::warn!(session_id = session.id(), error = %e, "Dropping job outcome");
                if let JobOutcome::Completed(path) = &outcome {
                    self.store
                        .delete_best_effort(session.id(), std::slice::from_ref(path))
                        .await;
                }
                return;
            }

            let frame = match &outcome {
                JobOutcome::Completed(path) => {
                    tracing::info!(
                        session_id = session.id(),
                        path = %path.display(),
                        "Generation completed",
                    );
                    ServerFrame::completed(result_url(session.id()))
                }
                JobOutcome::Failed(message) => {
                    tracing::warn!(
                        session_id = session.id(),
                        error = %message,
                        "Generation failed",
                    );
                    ServerFrame::error(message.clone())
                }
            };
            session.deliver(&frame).await;

            if !session.release_job().await {
                return;
            }
            tracing::info!(session_id = session.id(), "Sketch changed during job, regenerating");
        }
    }

    /// Write the generated image to the result store. Runs outside the
    /// cancellable section. Every failure becomes a [`JobOutcome::Failed`]
    /// carrying the message shown to the client.
    async fn store_output(
        &self,
        session: &Session,
        generated: Result<Vec<u8>, CoreError>,
    ) -> JobOutcome {
        let saved = match generated {
            Ok(bytes) => self.store.save_result(session.id(), &bytes).await,
            Err(e) => Err(e),
        };
        match saved {
            Ok(path) => JobOutcome::Completed(path),
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }

    /// One job from render to fetched output image bytes.
    async fn generate(&self, session: &Session) -> Result<Vec<u8>, CoreError> {
        let (sketch, style) = session
            .job_input()
            .await
            .ok_or_else(|| CoreError::Validation("No sketch uploaded".into()))?;

        let workflow = self.templates.render(&style, &sketch).await?;

        let prompt_id = self
            .engine
            .submit(&workflow)
            .await
            .map_err(|e| CoreError::EngineSubmitFailed(e.to_string()))?;
        tracing::info!(
            session_id = session.id(),
            prompt_id = %prompt_id,
            style = %style,
            "Workflow submitted",
        );

        session.mark_polling(&prompt_id).await?;

        let entry = self.poll_until_done(session, &prompt_id).await?;

        let image = entry.first_image().ok_or_else(|| {
            CoreError::ResultMissing("Engine finished without an output image".into())
        })?;
        self.engine.fetch_image(image).await.map_err(|e| {
            CoreError::ResultMissing(format!("Could not fetch {}: {e}", image.filename))
        })
    }

    /// Poll the engine until the prompt reaches a terminal status, emitting
    /// a `processing` frame per poll.
    async fn poll_until_done(
        &self,
        session: &Session,
        prompt_id: &str,
    ) -> Result<sketchflow_comfyui::history::HistoryEntry, CoreError> {
        let mut progress = ProgressAccumulator::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let entry = self.engine.history(prompt_id).await.map_err(|e| {
                CoreError::EngineReportedError(format!("Status query failed: {e}"))
            })?;

            let Some(entry) = entry else {
                session
                    .deliver(&ServerFrame::processing(progress.current()))
                    .await;
                continue;
            };

            match entry.execution_status() {
                ExecutionStatus::Failed(message) => {
                    return Err(CoreError::EngineReportedError(message));
                }
                ExecutionStatus::Succeeded => return Ok(entry),
                ExecutionStatus::Running => {
                    let value = progress.update(entry.message_events());
                    tracing::trace!(
                        session_id = session.id(),
                        prompt_id,
                        progress = value,
                        "Polled",
                    );
                    session.deliver(&ServerFrame::processing(value)).await;
                }
            }
        }
    }

    /// The session was retired mid-job: ask the engine to drop the prompt.
    async fn abandon(&self, session: &Session) {
        let prompt = session.state().await.active_prompt.take();
        let Some(prompt_id) = prompt else {
            tracing::debug!(session_id = session.id(), "Job cancelled before submission");
            return;
        };

        match self.engine.cancel(&prompt_id).await {
            Ok(()) => {
                tracing::info!(
                    session_id = session.id(),
                    prompt_id = %prompt_id,
                    "Abandoned prompt cancelled",
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = session.id(),
                    prompt_id = %prompt_id,
                    error = %e,
                    "Failed to cancel abandoned prompt",
                );
            }
        }
    }
}
