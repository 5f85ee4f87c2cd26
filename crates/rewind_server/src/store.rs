//! Record store interface and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::db::DbError;
use crate::move_log::Move;
use crate::room::{Room, RoomId};

/// Durable storage for rooms and their move logs.
///
/// Writes for one room are only issued while the coordinator holds that
/// room's lock. Reads may happen at any time and see the last committed
/// state.
#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    /// Inserts a new room. Returns `false` if the identifier is taken.
    async fn insert_room(&self, room: &Room) -> Result<bool, DbError>;

    /// Loads a room by identifier.
    async fn room(&self, id: &RoomId) -> Result<Option<Room>, DbError>;

    /// Overwrites the projection of an existing room.
    async fn update_room(&self, room: &Room) -> Result<(), DbError>;

    /// Appends `mv` to its room's log and stores `room` as the new
    /// projection, as one unit: either both land or neither does.
    ///
    /// Fails if `mv` is not numbered directly after the current latest entry.
    async fn append_move(&self, mv: &Move, room: &Room) -> Result<(), DbError>;

    /// All moves of a room, ascending by sequence number.
    async fn moves(&self, id: &RoomId) -> Result<Vec<Move>, DbError>;

    /// The highest-numbered move of a room.
    async fn latest_move(&self, id: &RoomId) -> Result<Option<Move>, DbError>;

    /// The move with the given sequence number, if recorded.
    async fn move_at(&self, id: &RoomId, sequence_number: u32) -> Result<Option<Move>, DbError>;
}

#[derive(Debug, Default)]
struct RoomEntry {
    room: Option<Room>,
    log: Vec<Move>,
}

/// Process-local store, used for tests and `--memory` mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rooms: Arc<Mutex<HashMap<RoomId, RoomEntry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating in-memory store");
        Self::default()
    }

    fn with_rooms<T>(&self, f: impl FnOnce(&mut HashMap<RoomId, RoomEntry>) -> T) -> T {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rooms)
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    async fn insert_room(&self, room: &Room) -> Result<bool, DbError> {
        self.with_rooms(|rooms| {
            let entry = rooms.entry(room.id().clone()).or_default();
            if entry.room.is_some() {
                debug!("Room id already taken");
                return Ok(false);
            }
            entry.room = Some(room.clone());
            Ok(true)
        })
    }

    #[instrument(skip(self))]
    async fn room(&self, id: &RoomId) -> Result<Option<Room>, DbError> {
        Ok(self.with_rooms(|rooms| rooms.get(id).and_then(|e| e.room.clone())))
    }

    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    async fn update_room(&self, room: &Room) -> Result<(), DbError> {
        self.with_rooms(|rooms| match rooms.get_mut(room.id()) {
            Some(RoomEntry { room: Some(stored), .. }) => {
                *stored = room.clone();
                Ok(())
            }
            _ => Err(DbError::new(format!("Room {} does not exist", room.id()))),
        })
    }

    #[instrument(skip(self, mv, room), fields(room_id = %room.id(), move_number = *mv.sequence_number()))]
    async fn append_move(&self, mv: &Move, room: &Room) -> Result<(), DbError> {
        self.with_rooms(|rooms| {
            let entry = rooms
                .get_mut(room.id())
                .filter(|e| e.room.is_some())
                .ok_or_else(|| DbError::new(format!("Room {} does not exist", room.id())))?;

            let expected = entry.log.last().map_or(0, |m| *m.sequence_number()) + 1;
            if *mv.sequence_number() != expected {
                return Err(DbError::new(format!(
                    "Move number {} conflicts, expected {}",
                    mv.sequence_number(),
                    expected
                )));
            }

            entry.log.push(mv.clone());
            entry.room = Some(room.clone());
            Ok(())
        })
    }

    #[instrument(skip(self))]
    async fn moves(&self, id: &RoomId) -> Result<Vec<Move>, DbError> {
        Ok(self.with_rooms(|rooms| rooms.get(id).map(|e| e.log.clone()).unwrap_or_default()))
    }

    #[instrument(skip(self))]
    async fn latest_move(&self, id: &RoomId) -> Result<Option<Move>, DbError> {
        Ok(self.with_rooms(|rooms| rooms.get(id).and_then(|e| e.log.last().cloned())))
    }

    #[instrument(skip(self))]
    async fn move_at(&self, id: &RoomId, sequence_number: u32) -> Result<Option<Move>, DbError> {
        Ok(self.with_rooms(|rooms| {
            rooms.get(id).and_then(|e| {
                e.log
                    .iter()
                    .find(|m| *m.sequence_number() == sequence_number)
                    .cloned()
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_log::NewMove;
    use rewind_board::{Board, Mark, apply_move};

    fn first_move(room: &Room) -> Move {
        let board = apply_move(&Board::new(), 4, Mark::X).unwrap();
        Move::next(None, NewMove::new(room.id().clone(), Mark::X, 4, 0, board))
    }

    #[tokio::test]
    async fn test_insert_and_load_room() {
        let store = MemoryStore::new();
        let room = Room::create();
        assert!(store.insert_room(&room).await.unwrap());
        assert!(!store.insert_room(&room).await.unwrap());
        assert_eq!(store.room(room.id()).await.unwrap(), Some(room));
    }

    #[tokio::test]
    async fn test_missing_room_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.room(&"NOPE00".into()).await.unwrap(), None);
        assert!(store.moves(&"NOPE00".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_room_fails() {
        let store = MemoryStore::new();
        assert!(store.update_room(&Room::create()).await.is_err());
    }

    #[tokio::test]
    async fn test_append_updates_log_and_room_together() {
        let store = MemoryStore::new();
        let room = Room::create().add_player("a").unwrap().add_player("b").unwrap();
        store.insert_room(&room).await.unwrap();

        let mv = first_move(&room);
        let next = room.record_move(&mv);
        store.append_move(&mv, &next).await.unwrap();

        assert_eq!(store.latest_move(room.id()).await.unwrap(), Some(mv.clone()));
        assert_eq!(store.move_at(room.id(), 1).await.unwrap(), Some(mv));
        assert_eq!(store.move_at(room.id(), 2).await.unwrap(), None);
        assert_eq!(store.room(room.id()).await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn test_append_rejects_duplicate_number() {
        let store = MemoryStore::new();
        let room = Room::create();
        store.insert_room(&room).await.unwrap();

        let mv = first_move(&room);
        store.append_move(&mv, &room).await.unwrap();
        assert!(store.append_move(&mv, &room).await.is_err());
        assert_eq!(store.moves(room.id()).await.unwrap().len(), 1);
    }
}
