//! HTTP and WebSocket surface.
//!
//! `GET /ws` upgrades to the real-time protocol; the REST routes are thin
//! reads and room creation over the same [`SessionCoordinator`].

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::coordinator::SessionCoordinator;
use crate::error::SessionError;
use crate::gateway::ConnectionId;
use crate::move_log::Move;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::{Room, RoomId};

/// Builds the application router.
pub fn router(coordinator: SessionCoordinator) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{id}", get(get_room))
        .route("/api/rooms/{id}/history", get(get_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(coordinator)
}

/// Binds the configured address and serves until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
#[instrument(skip(config, coordinator), fields(addr = %config.bind_address()))]
pub async fn serve(config: &ServerConfig, coordinator: SessionCoordinator) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(addr = %listener.local_addr()?, "Server listening");
    axum::serve(listener, router(coordinator)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Error body for REST responses.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

/// REST wrapper mapping session errors to status codes.
#[derive(Debug)]
struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::RoomNotFound => StatusCode::NOT_FOUND,
            SessionError::Storage(e) => {
                error!(error = %e, "Storage failure in REST handler");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Room together with its complete log.
#[derive(Debug, Serialize)]
struct RoomHistory {
    room: Room,
    history: Vec<Move>,
}

#[instrument(skip(coordinator))]
async fn create_room(
    State(coordinator): State<SessionCoordinator>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    let room = coordinator.create_room().await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[instrument(skip(coordinator))]
async fn get_room(
    State(coordinator): State<SessionCoordinator>,
    Path(id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    let (room, _) = coordinator.snapshot(&RoomId::from(id)).await?;
    Ok(Json(room))
}

#[instrument(skip(coordinator))]
async fn get_history(
    State(coordinator): State<SessionCoordinator>,
    Path(id): Path<String>,
) -> Result<Json<RoomHistory>, ApiError> {
    let (room, history) = coordinator.snapshot(&RoomId::from(id)).await?;
    Ok(Json(RoomHistory { room, history }))
}

async fn ws_handler(
    State(coordinator): State<SessionCoordinator>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(coordinator, socket))
}

/// Drives one WebSocket connection until either side closes it.
async fn handle_socket(coordinator: SessionCoordinator, socket: WebSocket) {
    let (conn, mut outbox) = coordinator.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(connection = %conn, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(connection = %conn, "Socket closed while sending");
                break;
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch(&coordinator, conn, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %conn, error = %e, "Socket read failed");
                break;
            }
        }
    }

    coordinator.disconnect(conn);
    writer.abort();
}

/// Parses one inbound frame and hands it to the coordinator.
#[instrument(skip(coordinator, text))]
async fn dispatch(coordinator: &SessionCoordinator, conn: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => coordinator.handle(conn, message).await,
        Err(e) => {
            warn!(connection = %conn, error = %e, "Malformed frame");
            coordinator
                .gateway()
                .send_to(conn, ServerMessage::error("Malformed message"));
        }
    }
}
