//! Database rows and their conversion to domain types.
//!
//! Roster and board are stored as JSON text; they are decoded here and
//! nowhere else.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use diesel::prelude::*;
use rewind_board::{Board, Mark};
use tracing::instrument;

use crate::db::{DbError, schema};
use crate::move_log::Move;
use crate::room::{Room, RoomStatus, Winner};

/// Room row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Getters)]
#[diesel(table_name = schema::rooms)]
pub struct RoomRecord {
    id: String,
    players: String,
    board: String,
    current_player: Option<String>,
    game_status: String,
    winner: Option<String>,
    cursor_move: i32,
    created_at: NaiveDateTime,
}

/// Mutable columns of a room row.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = schema::rooms)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct RoomChanges {
    players: String,
    board: String,
    current_player: Option<String>,
    game_status: String,
    winner: Option<String>,
    cursor_move: i32,
}

/// Movement row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Getters)]
#[diesel(table_name = schema::movements)]
pub struct MoveRecord {
    id: String,
    room_id: String,
    player: String,
    position: i32,
    move_number: i32,
    parent_move: i32,
    board: String,
    created_at: NaiveDateTime,
}

fn to_i32(value: u32, column: &str) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::new(format!("{} out of range: {}", column, value)))
}

fn to_u32(value: i32, column: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::new(format!("Negative {}: {}", column, value)))
}

fn parse_mark(s: &str) -> Result<Mark, DbError> {
    s.parse()
        .map_err(|_| DbError::new(format!("Invalid mark: '{}'", s)))
}

impl TryFrom<&Room> for RoomRecord {
    type Error = DbError;

    #[instrument(skip(room), fields(room_id = %room.id()))]
    fn try_from(room: &Room) -> Result<Self, Self::Error> {
        Ok(Self {
            id: room.id().to_string(),
            players: serde_json::to_string(room.players())?,
            board: serde_json::to_string(room.board())?,
            current_player: room.current_player().clone(),
            game_status: room.game_status().to_string(),
            winner: room.winner().as_ref().map(Winner::to_string),
            cursor_move: to_i32(*room.cursor(), "cursor_move")?,
            created_at: *room.created_at(),
        })
    }
}

impl TryFrom<&Room> for RoomChanges {
    type Error = DbError;

    fn try_from(room: &Room) -> Result<Self, Self::Error> {
        let record = RoomRecord::try_from(room)?;
        Ok(Self {
            players: record.players,
            board: record.board,
            current_player: record.current_player,
            game_status: record.game_status,
            winner: record.winner,
            cursor_move: record.cursor_move,
        })
    }
}

impl TryFrom<RoomRecord> for Room {
    type Error = DbError;

    #[instrument(skip(record), fields(room_id = %record.id))]
    fn try_from(record: RoomRecord) -> Result<Self, Self::Error> {
        let players: Vec<String> = serde_json::from_str(&record.players)?;
        let board: Board = serde_json::from_str(&record.board)?;
        let game_status: RoomStatus = record
            .game_status
            .parse()
            .map_err(|_| DbError::new(format!("Invalid game status: '{}'", record.game_status)))?;
        let winner = record
            .winner
            .as_deref()
            .map(str::parse::<Winner>)
            .transpose()
            .map_err(|_| DbError::new(format!("Invalid winner: {:?}", record.winner)))?;

        Ok(Room {
            id: record.id.into(),
            players,
            board,
            current_player: record.current_player,
            game_status,
            winner,
            cursor: to_u32(record.cursor_move, "cursor_move")?,
            created_at: record.created_at,
        })
    }
}

impl TryFrom<&Move> for MoveRecord {
    type Error = DbError;

    fn try_from(mv: &Move) -> Result<Self, Self::Error> {
        Ok(Self {
            id: mv.id().clone(),
            room_id: mv.room_id().to_string(),
            player: mv.mover().to_string(),
            position: i32::from(*mv.position()),
            move_number: to_i32(*mv.sequence_number(), "move_number")?,
            parent_move: to_i32(*mv.parent(), "parent_move")?,
            board: serde_json::to_string(mv.board_after())?,
            created_at: *mv.created_at(),
        })
    }
}

impl TryFrom<MoveRecord> for Move {
    type Error = DbError;

    #[instrument(skip(record), fields(move_id = %record.id))]
    fn try_from(record: MoveRecord) -> Result<Self, Self::Error> {
        let position = u8::try_from(record.position)
            .map_err(|_| DbError::new(format!("Invalid position: {}", record.position)))?;
        Ok(Move {
            id: record.id,
            room_id: record.room_id.into(),
            mover: parse_mark(&record.player)?,
            position,
            sequence_number: to_u32(record.move_number, "move_number")?,
            parent: to_u32(record.parent_move, "parent_move")?,
            board_after: serde_json::from_str(&record.board)?,
            created_at: record.created_at,
        })
    }
}
