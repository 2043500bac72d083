use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use sketchflow_core::error::CoreError;
use sketchflow_core::frames::{parse_client_frame, ClientFrame, ServerFrame};
use sketchflow_core::job::JobState;
use sketchflow_core::payload::decode_image_payload;

use crate::engine::result_url;
use crate::session::Session;
use crate::state::AppState;
use crate::ws::{start_liveness, Attachment};

/// How long the writer task may keep flushing after the reader loop ends.
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP handler that upgrades `/api/ws/{session_id}` to a WebSocket.
///
/// Frames carry base64 images, so the message limit is twice the upload
/// limit to leave room for the encoding overhead.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let max_message = state.config.storage.max_upload_bytes.saturating_mul(2);
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Serve one push channel after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Attaches the connection to its session, replacing any older one.
///   2. Spawns the liveness task and a sender task that forwards queued frames.
///   3. Dispatches inbound frames until the client leaves or the server closes
///      the channel.
///   4. Detaches, unless a newer connection already took over.
async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let Some(session) = state.registry.get(&session_id).await else {
        tracing::info!(session_id = %session_id, "WebSocket for unknown session rejected");
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Utf8Bytes::from_static("Session not found"),
            })))
            .await;
        return;
    };

    let Attachment {
        conn_id,
        mut receiver,
        closed,
    } = state.channels.attach(&session).await;
    tracing::info!(session_id = %session_id, conn_id = %conn_id, "WebSocket connected");

    let liveness = start_liveness(
        Arc::clone(&state.channels),
        Arc::clone(&session),
        conn_id.clone(),
    );

    // Sender task: forward queued frames until the session drops the handle
    // or a Close frame goes out.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = receiver.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if is_close {
                break;
            }
        }
    });

    resume_pending_job(&state, &session).await;

    loop {
        let next = tokio::select! {
            _ = closed.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => handle_frame(&state, &session, text.as_str()).await,
            Some(Ok(Message::Binary(_))) => {
                session
                    .deliver(&ServerFrame::error("Binary frames are not supported"))
                    .await;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                tracing::trace!(conn_id = %conn_id, "Ping/pong received");
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: detach (dropping the sender ends the writer) and stop liveness.
    state.channels.detach(&session, &conn_id).await;
    liveness.abort();
    let send_abort = send_task.abort_handle();
    if tokio::time::timeout(SEND_DRAIN_TIMEOUT, send_task).await.is_err() {
        send_abort.abort();
    }
    tracing::info!(session_id = %session_id, conn_id = %conn_id, "WebSocket disconnected");
}

/// Bring a freshly attached client up to date while the session is idle:
/// replay the completed frame if a result exists, otherwise start the
/// generation for an uploaded sketch.
async fn resume_pending_job(state: &AppState, session: &Arc<Session>) {
    let (idle, has_sketch, has_result) = {
        let s = session.state().await;
        (
            s.job == JobState::Idle,
            s.sketch_path.is_some(),
            s.result_path.is_some(),
        )
    };
    if !idle {
        return;
    }

    if has_result {
        session
            .deliver(&ServerFrame::completed(result_url(session.id())))
            .await;
    } else if has_sketch {
        state.orchestrator.trigger(session).await;
    }
}

/// Dispatch one inbound text frame. Failures are reported to the client as
/// an error frame; the channel stays open.
async fn handle_frame(state: &AppState, session: &Arc<Session>, text: &str) {
    let frame = match parse_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(session_id = session.id(), error = %e, "Rejected client frame");
            session.deliver(&ServerFrame::error(e.to_string())).await;
            return;
        }
    };

    let outcome = match frame {
        ClientFrame::Heartbeat => {
            state.channels.record_heartbeat(session).await;
            Ok(())
        }
        ClientFrame::SketchUpdate { sketch_data } => {
            accept_sketch(state, session, &sketch_data).await
        }
        ClientFrame::ImageResult { image_data } => {
            accept_result(state, session, &image_data).await
        }
    };

    if let Err(e) = outcome {
        tracing::warn!(session_id = session.id(), error = %e, "Client frame failed");
        session.deliver(&ServerFrame::error(e.to_string())).await;
    }
}

fn decode_within_limit(state: &AppState, data: &str) -> Result<Vec<u8>, CoreError> {
    let bytes = decode_image_payload(data)?;
    let limit = state.config.storage.max_upload_bytes;
    if bytes.len() > limit {
        return Err(CoreError::Validation(format!(
            "Image is {} bytes, limit is {limit}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Store a new sketch revision and ask for a (re)generation.
async fn accept_sketch(
    state: &AppState,
    session: &Arc<Session>,
    sketch_data: &str,
) -> Result<(), CoreError> {
    let bytes = decode_within_limit(state, sketch_data)?;
    let path = state.store.attach_sketch(session, &bytes).await?;
    tracing::debug!(session_id = session.id(), path = %path.display(), "Sketch updated");
    state.orchestrator.trigger(session).await;
    Ok(())
}

/// Store an image handed back by the client as the session's result.
async fn accept_result(
    state: &AppState,
    session: &Arc<Session>,
    image_data: &str,
) -> Result<(), CoreError> {
    let bytes = decode_within_limit(state, image_data)?;
    state.store.attach_result(session, &bytes).await?;
    session
        .deliver(&ServerFrame::completed(result_url(session.id())))
        .await;
    Ok(())
}
