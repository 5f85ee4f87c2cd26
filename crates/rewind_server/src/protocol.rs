//! Real-time message types.
//!
//! Each WebSocket text frame carries one JSON object of the form
//! `{"event": "<kind>", "data": {...}}` with camelCase payload fields.

use rewind_board::{Board, Mark};
use serde::{Deserialize, Serialize};

use crate::move_log::Move;
use crate::room::{Room, RoomId, RoomStatus, Winner};

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Take (or retake) a seat in a room.
    JoinGame {
        /// Target room.
        room_id: RoomId,
        /// Self-asserted participant label.
        username: String,
    },
    /// Place the caller's mark.
    MakeMove {
        /// Target room.
        room_id: RoomId,
        /// Cell index; anything outside 0-8 is rejected as an invalid move.
        position: i64,
    },
    /// Rewind the room to the board after `move_number` (0 = start).
    RestoreToMove {
        /// Target room.
        room_id: RoomId,
        /// Sequence number to restore.
        move_number: i64,
    },
}

/// The move just made, attached to `boardUpdated` after a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMove {
    /// Mark that was placed.
    pub player: Mark,
    /// Cell index.
    pub position: u8,
    /// Sequence number assigned to the move.
    pub move_number: u32,
}

impl From<&Move> for LastMove {
    fn from(mv: &Move) -> Self {
        Self {
            player: *mv.mover(),
            position: *mv.position(),
            move_number: *mv.sequence_number(),
        }
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full snapshot for a connection that just joined.
    GameState {
        /// Room projection.
        room: Room,
        /// Complete move log.
        history: Vec<Move>,
        /// Mark assigned to the joining participant.
        player_symbol: Mark,
        /// Seat index of the joining participant.
        player_index: usize,
        /// Label the connection is bound to.
        username: String,
    },
    /// Roster changed (or a participant reconnected).
    PlayerJoined {
        /// Seated labels in seat order.
        players: Vec<String>,
        /// Room status after the join.
        game_status: RoomStatus,
        /// Complete move log.
        history: Vec<Move>,
    },
    /// Board changed through a move or a rewind.
    BoardUpdated {
        /// Current board.
        board: Board,
        /// Label to move next.
        current_player: Option<String>,
        /// Room status.
        game_status: RoomStatus,
        /// Winner once finished.
        winner: Option<Winner>,
        /// Complete move log.
        history: Vec<Move>,
        /// Present only after a move.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_move: Option<LastMove>,
    },
    /// Rejection notice for the originating connection.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Builds a `boardUpdated` message from a room projection.
    pub fn board_updated(room: &Room, history: Vec<Move>, last_move: Option<LastMove>) -> Self {
        Self::BoardUpdated {
            board: *room.board(),
            current_player: room.current_player().clone(),
            game_status: *room.game_status(),
            winner: *room.winner(),
            history,
            last_move,
        }
    }

    /// Builds an `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "joinGame",
            "data": { "roomId": "AB12CD", "username": "alice" }
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinGame {
                room_id: "AB12CD".into(),
                username: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_parse_move_allows_negative_position() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "makeMove",
            "data": { "roomId": "AB12CD", "position": -1 }
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::MakeMove { position: -1, .. }));
    }

    #[test]
    fn test_parse_restore() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "restoreToMove",
            "data": { "roomId": "AB12CD", "moveNumber": 3 }
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::RestoreToMove { move_number: 3, .. }));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientMessage, _> = serde_json::from_value(json!({
            "event": "leaveGame",
            "data": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_board_updated_omits_absent_last_move() {
        let room = Room::create();
        let json = serde_json::to_value(ServerMessage::board_updated(&room, Vec::new(), None)).unwrap();
        assert_eq!(json["event"], "boardUpdated");
        assert_eq!(json["data"]["gameStatus"], "waiting");
        assert!(json["data"]["currentPlayer"].is_null());
        assert!(json["data"].get("lastMove").is_none());
    }

    #[test]
    fn test_error_shape() {
        let json = serde_json::to_value(ServerMessage::error("Not your turn")).unwrap();
        assert_eq!(json, json!({ "event": "error", "data": { "message": "Not your turn" } }));
    }
}
