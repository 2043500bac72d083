//! Integration tests for the HTTP surface: health, styles, upload, result
//! retrieval, and the JSON error envelope.

mod common;

use axum::http::StatusCode;
use common::{body_bytes, body_json, get, post_multipart, test_env, test_env_with, wait_until};
use common::{Part, StubEngine};

// ---------------------------------------------------------------------------
// Test: GET /health reports status, version and the session count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let env = test_env(StubEngine::echo(1));
    env.state.registry.create("s1", "realistic").await.unwrap();

    let response = get(env.app(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["active_sessions"], 1);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let env = test_env(StubEngine::echo(1));
    let response = get(env.app(), "/health").await;

    let request_id = response.headers().get("x-request-id");
    assert!(
        request_id.is_some(),
        "Response must contain an x-request-id header"
    );
    assert_eq!(request_id.unwrap().to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: GET /api/styles lists template files, sorted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn styles_lists_workflow_templates() {
    let env = test_env(StubEngine::echo(1));
    let workflow_dir = &env.state.config.storage.workflow_dir;
    std::fs::write(workflow_dir.join("anime.json"), "{}").unwrap();

    let json = body_json(get(env.app(), "/api/styles").await).await;
    assert_eq!(json["styles"], serde_json::json!(["anime", "realistic"]));
}

#[tokio::test]
async fn styles_defaults_when_directory_is_empty() {
    let env = test_env(StubEngine::echo(1));
    std::fs::remove_file(env.state.config.storage.workflow_dir.join("realistic.json")).unwrap();

    let json = body_json(get(env.app(), "/api/styles").await).await;
    assert_eq!(json["styles"], serde_json::json!(["realistic"]));
}

// ---------------------------------------------------------------------------
// Test: upload creates a session, stores the sketch, and generates a result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_creates_session_and_result_is_served() {
    let env = test_env(StubEngine::echo(2));

    let response = post_multipart(
        env.app(),
        "/api/sketch",
        &[
            Part::file("image/png", b"png-sketch"),
            Part::text("style_name", "realistic"),
            Part::text("session_id", "client-42"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["session_id"], "client-42");
    assert_eq!(json["status"], "uploaded");
    assert_eq!(json["websocket_url"], "/api/ws/client-42");

    let session = env.state.registry.get("client-42").await.unwrap();
    let s = &session;
    wait_until(|| async move { s.state().await.result_path.is_some() }).await;

    let response = get(env.app(), "/api/result/client-42").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(body_bytes(response).await, b"png-sketch");
}

// ---------------------------------------------------------------------------
// Test: upload without a session id generates one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_without_session_id_generates_one() {
    let env = test_env(StubEngine::echo(1));

    let response =
        post_multipart(env.app(), "/api/sketch", &[Part::file("image/png", b"x")]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let id = json["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert!(env.state.registry.get(id).await.is_some());
}

// ---------------------------------------------------------------------------
// Test: a second upload for the same id reuses the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_upload_reuses_session() {
    let env = test_env(StubEngine::echo(1));
    let parts = [Part::file("image/png", b"x"), Part::text("session_id", "s1")];

    post_multipart(env.app(), "/api/sketch", &parts).await;
    let response = post_multipart(env.app(), "/api/sketch", &parts).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.state.registry.len().await, 1);
}

// ---------------------------------------------------------------------------
// Test: admission rejection maps to 503 with the error envelope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_beyond_capacity_is_503() {
    let env = test_env_with(StubEngine::echo(1), |config| {
        config.sessions.max_active_sessions = 1;
    });

    let first = post_multipart(
        env.app(),
        "/api/sketch",
        &[Part::file("image/png", b"x"), Part::text("session_id", "a")],
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_multipart(
        env.app(),
        "/api/sketch",
        &[Part::file("image/png", b"x"), Part::text("session_id", "b")],
    )
    .await;
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(second).await;
    assert_eq!(json["code"], "ADMISSION_REJECTED");
    assert!(json["error"].is_string());
}

// ---------------------------------------------------------------------------
// Test: upload validation errors are 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_without_file_is_400() {
    let env = test_env(StubEngine::echo(1));
    let response =
        post_multipart(env.app(), "/api/sketch", &[Part::text("style_name", "realistic")]).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn upload_of_non_image_is_400() {
    let env = test_env(StubEngine::echo(1));
    let response = post_multipart(
        env.app(),
        "/api/sketch",
        &[Part::file("text/plain", b"hello")],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.state.registry.is_empty().await);
}

#[tokio::test]
async fn upload_with_invalid_session_id_is_400() {
    let env = test_env(StubEngine::echo(1));
    let response = post_multipart(
        env.app(),
        "/api/sketch",
        &[
            Part::file("image/png", b"x"),
            Part::text("session_id", "../../etc/passwd"),
        ],
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let env = test_env(StubEngine::echo(1));
    let big = vec![0u8; env.state.config.storage.max_upload_bytes + 1];
    let response = post_multipart(env.app(), "/api/sketch", &[Part::file("image/png", &big)]).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(env.state.registry.is_empty().await);
}

// ---------------------------------------------------------------------------
// Test: result retrieval 404s for unknown sessions and missing results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn result_for_unknown_session_is_404() {
    let env = test_env(StubEngine::echo(1));
    let response = get(env.app(), "/api/result/nobody").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn result_before_generation_is_404() {
    let env = test_env(StubEngine::echo(1));
    env.state.registry.create("s1", "realistic").await.unwrap();

    let response = get(env.app(), "/api/result/s1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "RESULT_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let env = test_env(StubEngine::echo(1));
    let response = get(env.app(), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
