//! Sketch upload.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use sketchflow_core::validation::{validate_session_id, validate_style_name, DEFAULT_STYLE};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response body for a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub status: &'static str,
    pub message: String,
    /// Path of the push channel for this session.
    pub websocket_url: String,
}

/// POST /api/sketch
///
/// Accepts a multipart form with a required `file` field (an image), an
/// optional `style_name` and an optional `session_id`. Creates the session
/// if the id is new (or absent), stores the sketch and starts a generation.
/// Returns 503 when the session limit is reached.
pub async fn upload_sketch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut file_data: Option<Vec<u8>> = None;
    let mut style_name: Option<String> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or("").to_string();
                if !content_type.starts_with("image/") {
                    return Err(AppError::BadRequest(format!(
                        "Expected an image upload, got '{content_type}'"
                    )));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if data.len() > max_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "Sketch is {} bytes, limit is {max_bytes}",
                        data.len()
                    )));
                }
                file_data = Some(data.to_vec());
            }
            "style_name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                style_name = Some(text);
            }
            "session_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                session_id = Some(text);
            }
            _ => {} // ignore unknown fields
        }
    }

    let data =
        file_data.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    let style = match style_name.map(|s| s.trim().to_string()) {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_STYLE.to_string(),
    };
    validate_style_name(&style)?;

    let session_id = match session_id.map(|s| s.trim().to_string()) {
        Some(id) if !id.is_empty() => {
            validate_session_id(&id)?;
            id
        }
        _ => uuid::Uuid::new_v4().to_string(),
    };

    let (session, created) = state.registry.get_or_create(&session_id, &style).await?;
    if !created {
        session.set_style(style.clone()).await;
    }

    state.store.attach_sketch(&session, &data).await?;
    let started = state.orchestrator.trigger(&session).await;

    tracing::info!(
        session_id = %session_id,
        style = %style,
        created,
        started,
        bytes = data.len(),
        "Sketch uploaded",
    );

    let message = if started {
        "Sketch uploaded, generation started"
    } else {
        "Sketch uploaded, generation queued behind the running job"
    };

    Ok(Json(UploadResponse {
        websocket_url: format!("/api/ws/{session_id}"),
        session_id,
        status: "uploaded",
        message: message.to_string(),
    }))
}
