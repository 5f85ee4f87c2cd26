//! SQLite persistence for rooms and move logs.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::DbError;
pub use models::{MoveRecord, RoomRecord};
pub use repository::{MIGRATIONS, SqliteStore};
