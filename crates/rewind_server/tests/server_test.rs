//! REST handler tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rewind_server::{MemoryStore, SessionCoordinator, router};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> (SessionCoordinator, Router) {
    let coordinator = SessionCoordinator::new(Arc::new(MemoryStore::new()));
    (coordinator.clone(), router(coordinator))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let (_, app) = app();
    let (status, body) = send(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_create_room() {
    let (coordinator, app) = app();
    let (status, body) = send(app, "POST", "/api/rooms").await;
    assert_eq!(status, StatusCode::CREATED);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["gameStatus"], "waiting");
    assert_eq!(json["players"], serde_json::json!([]));
    assert_eq!(json["board"].as_array().unwrap().len(), 9);

    let id = json["id"].as_str().unwrap();
    assert!(coordinator.snapshot(&id.into()).await.is_ok());
}

#[tokio::test]
async fn test_get_room() {
    let (coordinator, app) = app();
    let room = coordinator.create_room().await.unwrap();

    let (status, body) = send(app, "GET", &format!("/api/rooms/{}", room.id())).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], room.id().as_str());
    assert!(json["currentPlayer"].is_null());
}

#[tokio::test]
async fn test_unknown_room_is_404() {
    let (_, app) = app();
    let (status, body) = send(app, "GET", "/api/rooms/NOPE00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "message": "Room not found" }));
}

#[tokio::test]
async fn test_history() {
    let (coordinator, app) = app();
    let room = coordinator.create_room().await.unwrap();
    let id = room.id().clone();
    let (alice, _a) = coordinator.connect();
    let (bob, _b) = coordinator.connect();
    coordinator.join(alice, &id, "alice").await.unwrap();
    coordinator.join(bob, &id, "bob").await.unwrap();
    coordinator.make_move(alice, &id, 4).await.unwrap();
    coordinator.make_move(bob, &id, 0).await.unwrap();

    let (status, body) = send(app, "GET", &format!("/api/rooms/{}/history", id)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["room"]["gameStatus"], "playing");
    let history = json["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["moveNumber"], 1);
    assert_eq!(history[0]["player"], "X");
    assert_eq!(history[1]["position"], 0);
    assert_eq!(history[1]["parentMove"], 1);
}

#[tokio::test]
async fn test_history_of_unknown_room_is_404() {
    let (_, app) = app();
    let (status, _) = send(app, "GET", "/api/rooms/NOPE00/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
