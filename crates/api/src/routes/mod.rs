pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/api` route tree.
///
/// ```text
/// POST /sketch                 upload a sketch, start generation
/// GET  /styles                 available workflow styles
/// GET  /result/{session_id}    latest result image
/// GET  /ws/{session_id}        push channel (WebSocket)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/sketch", post(handlers::sketch::upload_sketch))
        .route("/styles", get(handlers::styles::list_styles))
        .route("/result/{session_id}", get(handlers::result::get_result))
        .route("/ws/{session_id}", get(ws::ws_handler))
}
