use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use sketchflow_core::error::CoreError;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /api/result/{session_id}
///
/// Returns the session's latest result image. Unknown sessions and sessions
/// without a result are both 404.
pub async fn get_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session = state
        .registry
        .get(&session_id)
        .await
        .ok_or_else(|| CoreError::SessionNotFound(session_id.clone()))?;

    let path = session
        .state()
        .await
        .result_path
        .clone()
        .ok_or_else(|| CoreError::ResultMissing(format!("No result for session {session_id}")))?;

    let bytes = state.store.read(&path).await?;
    Ok(([(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, "no-store")], bytes))
}
