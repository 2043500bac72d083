//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, history retrieval,
//! image download, queue deletion) using [`reqwest`].

use serde::Deserialize;

use crate::history::{HistoryEntry, HistoryResponse, ImageRef};

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    /// Identifier sent with every submission so ComfyUI can attribute
    /// prompts to this server.
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// `/prompt` answered 2xx but without a `prompt_id`.
    #[error("ComfyUI accepted the workflow but returned no prompt_id")]
    MissingPromptId,
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the node graph and this client's id and
    /// returns the server-assigned `prompt_id`.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<String, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        let prompt_id = submitted
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or(ComfyUIApiError::MissingPromptId)?;

        tracing::debug!(
            prompt_id = %prompt_id,
            queue_number = ?submitted.number,
            "Workflow queued on ComfyUI",
        );
        Ok(prompt_id)
    }

    /// Remove a queued prompt.
    ///
    /// Sends `POST /queue` asking ComfyUI to delete the prompt. A prompt
    /// that is already executing is not interrupted.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Retrieve the history record of one prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. Returns `None` while ComfyUI has
    /// not recorded the prompt yet.
    pub async fn get_history(
        &self,
        prompt_id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        let mut history: HistoryResponse = Self::parse_response(response).await?;
        Ok(history.remove(prompt_id))
    }

    /// Download an output image.
    ///
    /// Sends `GET /view?filename=..&subfolder=..&type=..`.
    pub async fn view_image(&self, image: &ImageRef) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
