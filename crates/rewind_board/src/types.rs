//! Core domain types for the board.

use serde::{Deserialize, Serialize};

/// Number of cells on the board.
pub const CELLS: usize = 9;

/// Symbol placed on the board.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
pub enum Mark {
    /// First seat, moves first.
    X,
    /// Second seat.
    O,
}

impl Mark {
    /// Returns the other mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Returns the mark belonging to a seat index (0 or 1).
    pub fn for_seat(seat: usize) -> Option<Self> {
        match seat {
            0 => Some(Mark::X),
            1 => Some(Mark::O),
            _ => None,
        }
    }

    /// Returns the seat index this mark belongs to.
    pub fn seat(self) -> usize {
        match self {
            Mark::X => 0,
            Mark::O => 1,
        }
    }
}

/// A cell on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Square {
    /// Nothing placed yet.
    #[default]
    Empty,
    /// Holds a mark.
    Occupied(Mark),
}

impl Square {
    /// Returns the mark in this square, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Square::Empty => None,
            Square::Occupied(mark) => Some(mark),
        }
    }
}

impl From<Option<Mark>> for Square {
    fn from(cell: Option<Mark>) -> Self {
        cell.map_or(Square::Empty, Square::Occupied)
    }
}

/// 3x3 board, squares in row-major order (0-8).
///
/// Serialized as a JSON array of nine nullable strings, e.g.
/// `[null,null,null,null,"X",null,null,null,null]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[Option<Mark>; CELLS]", into = "[Option<Mark>; CELLS]")]
pub struct Board {
    squares: [Square; CELLS],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a board from nullable cells.
    pub fn from_cells(cells: [Option<Mark>; CELLS]) -> Self {
        Self {
            squares: cells.map(Square::from),
        }
    }

    /// Returns the board as nullable cells.
    pub fn cells(&self) -> [Option<Mark>; CELLS] {
        self.squares.map(Square::mark)
    }

    /// Gets the square at the given position.
    pub fn get(&self, pos: usize) -> Option<Square> {
        self.squares.get(pos).copied()
    }

    /// Checks if the square at `pos` exists and is empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Square::Empty))
    }

    /// Returns all squares.
    pub fn squares(&self) -> &[Square; CELLS] {
        &self.squares
    }

    /// Number of marks placed so far (the ply of this position).
    pub fn marks(&self) -> usize {
        self.squares.iter().filter(|s| **s != Square::Empty).count()
    }

    /// Checks if every square is occupied.
    pub fn is_full(&self) -> bool {
        self.marks() == CELLS
    }

    pub(crate) fn place(&mut self, pos: usize, mark: Mark) {
        self.squares[pos] = Square::Occupied(mark);
    }

    /// Formats the board as a human-readable grid.
    pub fn display(&self) -> String {
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                let pos = row * 3 + col;
                match self.squares[pos] {
                    Square::Empty => result.push_str(&pos.to_string()),
                    Square::Occupied(mark) => result.push_str(mark.as_ref()),
                }
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl From<[Option<Mark>; CELLS]> for Board {
    fn from(cells: [Option<Mark>; CELLS]) -> Self {
        Self::from_cells(cells)
    }
}

impl From<Board> for [Option<Mark>; CELLS] {
    fn from(board: Board) -> Self {
        board.cells()
    }
}
