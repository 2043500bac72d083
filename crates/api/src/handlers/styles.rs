use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StylesResponse {
    pub styles: Vec<String>,
}

/// GET /api/styles
///
/// Styles are the template files in the workflow directory. Never fails;
/// an empty or unreadable directory lists the default style.
pub async fn list_styles(State(state): State<AppState>) -> Json<StylesResponse> {
    Json(StylesResponse {
        styles: state.templates.list_styles().await,
    })
}
