//! Move log entries and log traversal.
//!
//! Each [`Move`] carries a full snapshot of the board after it was played,
//! so rewinding to any entry is a single lookup. Entries are never mutated
//! or deleted. A move played after a rewind records the entry it was built
//! on in `parent`, which turns the log into a tree whose branches are
//! followed with [`line`].

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use derive_new::new;
use rewind_board::{Board, Mark, apply_move};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::room::{RoomId, random_token};

const MOVE_ID_LEN: usize = 14;

/// One accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub(crate) id: String,
    pub(crate) room_id: RoomId,
    #[serde(rename = "player")]
    pub(crate) mover: Mark,
    pub(crate) position: u8,
    #[serde(rename = "moveNumber")]
    pub(crate) sequence_number: u32,
    #[serde(rename = "parentMove")]
    pub(crate) parent: u32,
    #[serde(rename = "board")]
    pub(crate) board_after: Board,
    pub(crate) created_at: NaiveDateTime,
}

/// A move that has been validated but not yet numbered.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct NewMove {
    room_id: RoomId,
    mover: Mark,
    position: u8,
    parent: u32,
    board_after: Board,
}

impl Move {
    /// Numbers `draft` as the entry following `latest` (or as entry 1).
    ///
    /// Only call this while holding the room's lock, otherwise two drafts
    /// can receive the same number.
    #[instrument(skip_all, fields(room_id = %draft.room_id))]
    pub fn next(latest: Option<&Move>, draft: NewMove) -> Move {
        let sequence_number = latest.map_or(0, |m| m.sequence_number) + 1;
        Move {
            id: random_token(MOVE_ID_LEN),
            room_id: draft.room_id,
            mover: draft.mover,
            position: draft.position,
            sequence_number,
            parent: draft.parent,
            board_after: draft.board_after,
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// Failure to reproduce a board from the log.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ReplayError {
    /// A parent link points at a missing entry.
    #[display("Move {} not found in log", _0)]
    Missing(#[error(not(source))] u32),
    /// Applying a move to its parent's board was illegal.
    #[display("Move {} cannot be replayed: {}", number, reason)]
    Illegal {
        /// Offending sequence number.
        number: u32,
        /// Rule violation.
        reason: String,
    },
    /// The replayed board differs from the recorded snapshot.
    #[display("Move {} snapshot does not match replay", _0)]
    Diverged(#[error(not(source))] u32),
}

/// Returns the chain of moves leading to `cursor`, oldest first.
///
/// `moves` must be the complete log of one room. Cursor 0 yields an empty
/// line.
///
/// # Errors
///
/// Returns [`ReplayError::Missing`] if a link cannot be resolved.
pub fn line(moves: &[Move], cursor: u32) -> Result<Vec<&Move>, ReplayError> {
    let mut chain = Vec::new();
    let mut at = cursor;
    while at != 0 {
        let mv = moves
            .iter()
            .find(|m| m.sequence_number == at)
            .ok_or(ReplayError::Missing(at))?;
        // parents always precede their children
        if mv.parent >= at {
            return Err(ReplayError::Missing(mv.parent));
        }
        chain.push(mv);
        at = mv.parent;
    }
    chain.reverse();
    Ok(chain)
}

/// Replays `line` from an empty board, checking every snapshot.
///
/// # Errors
///
/// Returns [`ReplayError`] if a move is illegal on its predecessor's board
/// or a snapshot differs from the replayed board.
pub fn replay(line: &[&Move]) -> Result<Board, ReplayError> {
    line.iter().try_fold(Board::new(), |board, mv| {
        let next = apply_move(&board, usize::from(mv.position), mv.mover).map_err(|e| {
            ReplayError::Illegal {
                number: mv.sequence_number,
                reason: e.to_string(),
            }
        })?;
        if next != mv.board_after {
            return Err(ReplayError::Diverged(mv.sequence_number));
        }
        Ok(next)
    })
}
