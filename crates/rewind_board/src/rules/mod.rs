//! Game rules: move application and terminal detection.

mod draw;
mod win;

pub use win::LINES;

use crate::types::{Board, CELLS, Mark};
use tracing::instrument;

/// Classification of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// No line is complete and at least one square is empty.
    InProgress,
    /// `mark` completed `line`.
    Won {
        /// The winning mark.
        mark: Mark,
        /// The three cells forming the winning line, one of [`LINES`].
        line: [usize; 3],
    },
    /// Board is full and no line is complete.
    Draw,
}

impl Outcome {
    /// Returns true for won or drawn boards.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Error returned when a move cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum MoveError {
    /// Position is not on the board.
    #[display("Position {} is outside 0-8", _0)]
    OutOfBounds(#[error(not(source))] usize),

    /// Square is already taken.
    #[display("Square {} is already occupied", _0)]
    Occupied(#[error(not(source))] usize),
}

/// Places `mark` at `position` and returns the resulting board.
///
/// The input board is left untouched.
///
/// # Errors
///
/// Returns [`MoveError`] if `position` is outside 0-8 or already occupied.
#[instrument(skip(board))]
pub fn apply_move(board: &Board, position: usize, mark: Mark) -> Result<Board, MoveError> {
    if position >= CELLS {
        return Err(MoveError::OutOfBounds(position));
    }
    if !board.is_empty(position) {
        return Err(MoveError::Occupied(position));
    }

    let mut next = *board;
    next.place(position, mark);
    Ok(next)
}

/// Classifies a board as in progress, won or drawn.
#[instrument(skip(board), level = "trace")]
pub fn evaluate(board: &Board) -> Outcome {
    if let Some((mark, line)) = win::winning_line(board) {
        return Outcome::Won { mark, line };
    }
    if draw::is_full(board) {
        return Outcome::Draw;
    }
    Outcome::InProgress
}
