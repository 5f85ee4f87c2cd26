//! Draw detection.

use crate::types::Board;

/// Checks if the board is full. A full board with no winner is a draw.
pub(super) fn is_full(board: &Board) -> bool {
    board.is_full()
}
