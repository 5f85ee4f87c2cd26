//! Rewind Board - pure tic-tac-toe rules.
//!
//! This crate holds no state and performs no I/O. A [`Board`] is a plain
//! value; [`apply_move`] produces the next board and [`evaluate`] classifies
//! a board as in progress, won or drawn.
//!
//! # Example
//!
//! ```
//! use rewind_board::{Board, Mark, Outcome, apply_move, evaluate};
//!
//! let board = Board::new();
//! let board = apply_move(&board, 4, Mark::X)?;
//! assert_eq!(evaluate(&board), Outcome::InProgress);
//! # Ok::<(), rewind_board::MoveError>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod rules;
mod types;

pub use rules::{LINES, MoveError, Outcome, apply_move, evaluate};
pub use types::{Board, CELLS, Mark, Square};
