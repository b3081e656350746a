mod common;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use swarnabindu::api::router;
use swarnabindu::state::AppState;
use tower::ServiceExt;

async fn app(online: bool) -> (common::Harness, Router) {
    let h = common::harness(online);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");
    let state = AppState {
        db,
        queue: h.queue.clone(),
        sync: h.sync.clone(),
        connectivity: h.connectivity.clone(),
    };
    (h, router(state))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (_h, app) = app(false).await;
    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn offline_registration_is_queued_and_listed() {
    let (_h, app) = app(false).await;

    let (status, record) = send(
        &app,
        "POST",
        "/registrations",
        Some(json!({ "childName": "Sita", "gender": "female" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["status"]["state"], "pending");

    let (_, pending) = send(&app, "GET", "/registrations?status=pending", None).await;
    let (_, synced) = send(&app, "GET", "/registrations?status=synced", None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(synced.as_array().unwrap().len(), 0);
    assert_eq!(pending[0]["id"], record["id"]);
}

#[tokio::test]
async fn missing_required_field_is_rejected() {
    let (_h, app) = app(false).await;
    let (status, body) = send(&app, "POST", "/screenings", Some(json!({ "doseNumber": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("patientId"));
}

#[tokio::test]
async fn manual_sync_reports_offline_then_syncs() {
    let (h, app) = app(false).await;
    send(
        &app,
        "POST",
        "/screenings",
        Some(json!({ "patientId": "reg-1", "doseDate": "2025-03-14" })),
    )
    .await;

    let (status, body) = send(&app, "POST", "/sync", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot sync while offline");

    let (status, _) = send(&app, "PUT", "/connectivity", Some(json!({ "online": true }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.connectivity.is_online());

    let (status, body) = send(&app, "POST", "/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "synced");
    assert_eq!(body["screenings_pushed"], 1);

    let (_, body) = send(&app, "POST", "/sync", None).await;
    assert_eq!(body["outcome"], "nothing_pending");
}

#[tokio::test]
async fn failed_sync_is_bad_gateway() {
    let (h, app) = app(true).await;
    h.remote.set_fail_writes(true);
    send(&app, "POST", "/registrations", Some(json!({ "childName": "Sita", "gender": "female" }))).await;

    let (status, _) = send(&app, "POST", "/sync", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, status_body) = send(&app, "GET", "/sync/status", None).await;
    assert_eq!(status_body["pending"], 1);
    assert_eq!(status_body["online"], true);
    assert_eq!(status_body["sync_in_progress"], false);
    assert_eq!(status_body["queue"]["registrations"]["total"], 1);
}

#[tokio::test]
async fn clear_requires_confirmation() {
    let (h, app) = app(false).await;
    send(&app, "POST", "/registrations", Some(json!({ "childName": "Sita", "gender": "female" }))).await;

    let (status, _) = send(&app, "DELETE", "/queue", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.queue.pending_count().await.unwrap(), 1);

    let (status, _) = send(&app, "DELETE", "/queue?confirm=true", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn blocked_storage_fails_the_submission() {
    let (h, app) = app(false).await;
    h.store.set_fail_writes(true);

    let (status, body) = send(
        &app,
        "POST",
        "/registrations",
        Some(json!({ "childName": "Sita", "gender": "female" })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.get("id").is_none());
}

#[tokio::test]
async fn remote_summary_by_kind() {
    let (_h, app) = app(true).await;
    send(&app, "POST", "/registrations", Some(json!({ "childName": "Sita", "gender": "female" }))).await;

    let (status, body) = send(&app, "GET", "/remote/registrations?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "registration");

    let (status, _) = send(&app, "GET", "/remote/patients", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
