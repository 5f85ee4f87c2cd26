//! Rewind Rooms server.
//!
//! Two participants share a room, alternate marks on a tic-tac-toe board and
//! may rewind the room to any earlier point of its move log. Every room runs
//! its operations one at a time; connections subscribed to a room receive its
//! events in commit order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rewind_server::{MemoryStore, ServerConfig, SessionCoordinator, serve};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let coordinator = SessionCoordinator::new(Arc::new(MemoryStore::new()));
//! serve(&ServerConfig::default(), coordinator).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bindings;
mod config;
mod coordinator;
mod db;
mod error;
mod gateway;
mod move_log;
mod protocol;
mod room;
mod server;
mod store;

pub use bindings::{Binding, ConnectionBindings};
pub use config::{ConfigError, ServerConfig};
pub use coordinator::SessionCoordinator;
pub use db::{DbError, MIGRATIONS, MoveRecord, RoomRecord, SqliteStore};
pub use error::SessionError;
pub use gateway::{BroadcastGateway, ConnectionId, Outbox};
pub use move_log::{Move, NewMove, ReplayError, line, replay};
pub use protocol::{ClientMessage, LastMove, ServerMessage};
pub use room::{Room, RoomId, RoomStatus, Winner};
pub use server::{router, serve};
pub use store::{GameStore, MemoryStore};
