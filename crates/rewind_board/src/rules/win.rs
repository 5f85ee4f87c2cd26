//! Win detection.

use crate::types::{Board, Mark, Square};

/// The eight winning lines: three rows, three columns, two diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Returns the first complete line and its mark.
pub(super) fn winning_line(board: &Board) -> Option<(Mark, [usize; 3])> {
    let squares = board.squares();
    LINES.into_iter().find_map(|line @ [a, b, c]| match squares[a] {
        Square::Occupied(mark) if squares[a] == squares[b] && squares[a] == squares[c] => {
            Some((mark, line))
        }
        _ => None,
    })
}
