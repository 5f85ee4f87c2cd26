//! Session coordinator: the per-room state machine.
//!
//! Join, move and rewind for one room run one at a time under that room's
//! lock, covering validation, persistence and the enqueueing of broadcasts.
//! Rooms never share a lock, so operations on different rooms proceed in
//! parallel and no operation ever holds two room locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rewind_board::{Board, apply_move};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::bindings::ConnectionBindings;
use crate::error::SessionError;
use crate::gateway::{BroadcastGateway, ConnectionId, Outbox};
use crate::move_log::{Move, NewMove};
use crate::protocol::{ClientMessage, LastMove, ServerMessage};
use crate::room::{Room, RoomId, RoomStatus};
use crate::store::GameStore;

const CREATE_ATTEMPTS: usize = 8;

/// Owns live session state and serializes changes per room.
#[derive(Clone)]
pub struct SessionCoordinator {
    store: Arc<dyn GameStore>,
    locks: Arc<Mutex<HashMap<RoomId, Arc<AsyncMutex<()>>>>>,
    bindings: ConnectionBindings,
    gateway: BroadcastGateway,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("bindings", &self.bindings)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    /// Creates a coordinator over `store`.
    #[instrument(skip(store))]
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        info!("Creating session coordinator");
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
            bindings: ConnectionBindings::new(),
            gateway: BroadcastGateway::new(),
        }
    }

    /// Returns the connection bindings.
    pub fn bindings(&self) -> &ConnectionBindings {
        &self.bindings
    }

    /// Returns the broadcast gateway.
    pub fn gateway(&self) -> &BroadcastGateway {
        &self.gateway
    }

    /// Registers a new connection and returns its handle and outbound queue.
    #[instrument(skip(self))]
    pub fn connect(&self) -> (ConnectionId, Outbox) {
        let conn = ConnectionId::next();
        let outbox = self.gateway.register(conn);
        info!(connection = %conn, "Client connected");
        (conn, outbox)
    }

    /// Drops the binding and subscription of `conn`.
    ///
    /// Seats stay taken and in-flight room operations are not affected.
    #[instrument(skip(self))]
    pub fn disconnect(&self, conn: ConnectionId) {
        let binding = self.bindings.unbind(conn);
        let room = self.gateway.unsubscribe(conn);
        self.gateway.unregister(conn);
        info!(connection = %conn, ?binding, ?room, "Client disconnected");
    }

    /// Dispatches one inbound message, reporting rejections to `conn` only.
    #[instrument(skip(self, message))]
    pub async fn handle(&self, conn: ConnectionId, message: ClientMessage) {
        let result = match message {
            ClientMessage::JoinGame { room_id, username } => {
                self.join(conn, &room_id, &username).await
            }
            ClientMessage::MakeMove { room_id, position } => {
                self.make_move(conn, &room_id, position).await.map(|_| ())
            }
            ClientMessage::RestoreToMove {
                room_id,
                move_number,
            } => self.rewind_to(conn, &room_id, move_number).await.map(|_| ()),
        };

        if let Err(e) = result {
            self.reject(conn, &e);
        }
    }

    /// Sends an error notice for `err` to `conn`.
    pub fn reject(&self, conn: ConnectionId, err: &SessionError) {
        match err {
            SessionError::Storage(db) => warn!(connection = %conn, error = %db, "Storage failure"),
            other => warn!(connection = %conn, reason = %other, "Operation rejected"),
        }
        self.gateway.send_to(conn, ServerMessage::error(err.to_string()));
    }

    /// Creates and stores a fresh waiting room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the store fails or no unused
    /// identifier was found.
    #[instrument(skip(self))]
    pub async fn create_room(&self) -> Result<Room, SessionError> {
        for _ in 0..CREATE_ATTEMPTS {
            let room = Room::create();
            if self.store.insert_room(&room).await? {
                info!(room_id = %room.id(), "Room created");
                return Ok(room);
            }
            debug!(room_id = %room.id(), "Identifier collision, retrying");
        }
        Err(crate::db::DbError::new("No free room identifier").into())
    }

    /// Lock-free read of a room and its log, for display only.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RoomNotFound`] for unknown rooms.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, room_id: &RoomId) -> Result<(Room, Vec<Move>), SessionError> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(SessionError::RoomNotFound)?;
        let history = self.store.moves(room_id).await?;
        Ok((room, history))
    }

    /// Acquires the lock of an existing room and loads its projection.
    async fn lock_room(
        &self,
        room_id: &RoomId,
    ) -> Result<(OwnedMutexGuard<()>, Room), SessionError> {
        // rooms are never deleted, so checking before creating the lock entry
        // keeps unknown ids from growing the table
        if self.store.room(room_id).await?.is_none() {
            return Err(SessionError::RoomNotFound);
        }
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(room_id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or(SessionError::RoomNotFound)?;
        Ok((guard, room))
    }

    /// Seats `username` in the room and binds `conn` to the seat.
    ///
    /// Sends `gameState` to `conn` and broadcasts `playerJoined` to the room.
    ///
    /// # Errors
    ///
    /// [`SessionError::RoomNotFound`], [`SessionError::InvalidLabel`],
    /// [`SessionError::RoomFull`] or [`SessionError::Storage`].
    #[instrument(skip(self))]
    pub async fn join(
        &self,
        conn: ConnectionId,
        room_id: &RoomId,
        username: &str,
    ) -> Result<(), SessionError> {
        let (_guard, room) = self.lock_room(room_id).await?;

        let label = username.trim();
        if label.is_empty() {
            return Err(SessionError::InvalidLabel);
        }

        let next = room.add_player(label)?;
        let (seat, symbol) = next.seat(label).ok_or(SessionError::RoomFull)?;
        // read before committing so a failed read cannot follow a write
        let history = self.store.moves(room_id).await?;
        if next != room {
            self.store.update_room(&next).await?;
            info!(
                label,
                players = next.players().len(),
                status = %next.game_status(),
                "Player seated"
            );
        } else {
            debug!(label, "Player rejoined");
        }

        if let Some(stale) = self.bindings.bind(conn, room_id, label) {
            debug!(stale = %stale, "Replaced stale connection for seat");
        }
        self.gateway.subscribe(conn, room_id);

        self.gateway.send_to(
            conn,
            ServerMessage::GameState {
                room: next.clone(),
                history: history.clone(),
                player_symbol: symbol,
                player_index: seat,
                username: label.to_string(),
            },
        );
        self.gateway.publish(
            room_id,
            &ServerMessage::PlayerJoined {
                players: next.players().clone(),
                game_status: *next.game_status(),
                history,
            },
        );
        Ok(())
    }

    /// Places the caller's mark at `position`.
    ///
    /// On success the move is appended together with the updated projection
    /// and `boardUpdated` (with `lastMove`) is broadcast to the room.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotBound`], [`SessionError::RoomNotFound`],
    /// [`SessionError::GameNotActive`], [`SessionError::NotYourTurn`],
    /// [`SessionError::InvalidMove`] or [`SessionError::Storage`].
    #[instrument(skip(self))]
    pub async fn make_move(
        &self,
        conn: ConnectionId,
        room_id: &RoomId,
        position: i64,
    ) -> Result<Move, SessionError> {
        let binding = self.bindings.binding(conn).ok_or(SessionError::NotBound)?;
        if binding.room_id() != room_id {
            return Err(SessionError::NotBound);
        }
        let label = binding.label();

        let (_guard, room) = self.lock_room(room_id).await?;

        if *room.game_status() != RoomStatus::Playing {
            return Err(SessionError::GameNotActive);
        }
        if room.current_player().as_deref() != Some(label.as_str()) {
            return Err(SessionError::NotYourTurn);
        }
        let mark = room.mark_of(label).ok_or(SessionError::NotYourTurn)?;

        let cell = u8::try_from(position).map_err(|_| SessionError::InvalidMove)?;
        let board = apply_move(room.board(), usize::from(cell), mark).map_err(|e| {
            debug!(error = %e, "Move refused by board rules");
            SessionError::InvalidMove
        })?;

        let mut history = self.store.moves(room_id).await?;
        let mv = Move::next(
            history.last(),
            NewMove::new(room_id.clone(), mark, cell, *room.cursor(), board),
        );
        let next = room.record_move(&mv);
        self.store.append_move(&mv, &next).await?;
        history.push(mv.clone());

        info!(
            label = %label,
            mark = %mark,
            position = cell,
            move_number = *mv.sequence_number(),
            status = %next.game_status(),
            "Move applied"
        );

        self.gateway.publish(
            room_id,
            &ServerMessage::board_updated(&next, history, Some(LastMove::from(&mv))),
        );
        Ok(mv)
    }

    /// Points the room's projection at the board after `move_number`
    /// (0 = empty board) and broadcasts `boardUpdated`.
    ///
    /// Later moves stay in the log.
    ///
    /// # Errors
    ///
    /// [`SessionError::RoomNotFound`], [`SessionError::MoveNotFound`] or
    /// [`SessionError::Storage`].
    #[instrument(skip(self))]
    pub async fn rewind_to(
        &self,
        conn: ConnectionId,
        room_id: &RoomId,
        move_number: i64,
    ) -> Result<Room, SessionError> {
        let (_guard, room) = self.lock_room(room_id).await?;

        let number = u32::try_from(move_number).map_err(|_| SessionError::MoveNotFound)?;
        let board = if number == 0 {
            Board::new()
        } else {
            *self
                .store
                .move_at(room_id, number)
                .await?
                .ok_or(SessionError::MoveNotFound)?
                .board_after()
        };

        let next = room.restore_to(board, number);
        let history = self.store.moves(room_id).await?;
        self.store.update_room(&next).await?;
        info!(
            move_number = number,
            status = %next.game_status(),
            "Room rewound"
        );

        self.gateway
            .publish(room_id, &ServerMessage::board_updated(&next, history, None));
        Ok(next)
    }
}
