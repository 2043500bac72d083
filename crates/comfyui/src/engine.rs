//! The generation engine seam.
//!
//! The job orchestrator only needs four operations from the engine. They are
//! expressed as a trait so the orchestrator can run against ComfyUI in
//! production and against an in-memory engine in tests.

use async_trait::async_trait;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{HistoryEntry, ImageRef};

#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Queue a rendered node graph and return the engine's prompt id.
    async fn submit(&self, workflow: &serde_json::Value) -> Result<String, ComfyUIApiError>;

    /// Current history record of a prompt, `None` while it is unknown.
    async fn history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, ComfyUIApiError>;

    /// Download an output image.
    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError>;

    /// Drop a prompt the platform no longer wants.
    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;
}

#[async_trait]
impl GenerationEngine for ComfyUIApi {
    async fn submit(&self, workflow: &serde_json::Value) -> Result<String, ComfyUIApiError> {
        self.submit_workflow(workflow).await
    }

    async fn history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }

    async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_image(image).await
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancel_execution(prompt_id).await
    }
}
