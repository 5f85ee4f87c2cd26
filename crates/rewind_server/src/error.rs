//! Rejections returned by session operations.

use derive_more::{Display, Error};

use crate::db::DbError;

/// Reason a join, move or rewind was rejected.
///
/// Every variant leaves room state untouched; only the originating
/// connection is told, with the variant's display text.
#[derive(Debug, Clone, Display, Error)]
pub enum SessionError {
    /// No room with the requested identifier.
    #[display("Room not found")]
    RoomNotFound,
    /// Both seats are taken by other labels.
    #[display("Room is full")]
    RoomFull,
    /// Label is empty or whitespace.
    #[display("Username is required")]
    InvalidLabel,
    /// Connection has not joined the room it is acting on.
    #[display("Username not found")]
    NotBound,
    /// Room is waiting for players or already finished.
    #[display("Game is not active")]
    GameNotActive,
    /// Another player is to move.
    #[display("Not your turn")]
    NotYourTurn,
    /// Position is off the board or occupied.
    #[display("Invalid move")]
    InvalidMove,
    /// Rewind target was never recorded.
    #[display("Move not found")]
    MoveNotFound,
    /// The store failed; nothing was committed.
    #[display("Internal server error")]
    Storage(DbError),
}

impl From<DbError> for SessionError {
    fn from(err: DbError) -> Self {
        Self::Storage(err)
    }
}
