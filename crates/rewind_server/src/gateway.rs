//! Fan-out of server messages to the connections watching a room.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

use crate::protocol::ServerMessage;
use crate::room::RoomId;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle for one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("conn-{}", _0)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates a new handle.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiving end of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedReceiver<ServerMessage>;

#[derive(Debug, Default)]
struct Groups {
    outbound: HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>,
    room_of: HashMap<ConnectionId, RoomId>,
    members: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl Groups {
    fn leave(&mut self, conn: ConnectionId) -> Option<RoomId> {
        let room = self.room_of.remove(&conn)?;
        if let Some(members) = self.members.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                self.members.remove(&room);
            }
        }
        Some(room)
    }
}

/// Broadcast groups keyed by room.
///
/// Every registered connection owns an unbounded queue, so publishing never
/// waits on a slow socket. Messages enqueued by one caller keep their order.
#[derive(Debug, Clone, Default)]
pub struct BroadcastGateway {
    groups: Arc<Mutex<Groups>>,
}

impl BroadcastGateway {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_groups<T>(&self, f: impl FnOnce(&mut Groups) -> T) -> T {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut groups)
    }

    /// Registers a connection and returns its outbound queue.
    #[instrument(skip(self))]
    pub fn register(&self, conn: ConnectionId) -> Outbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_groups(|g| g.outbound.insert(conn, tx));
        debug!("Connection registered");
        rx
    }

    /// Puts `conn` in the broadcast group of `room`, leaving any previous group.
    #[instrument(skip(self))]
    pub fn subscribe(&self, conn: ConnectionId, room: &RoomId) {
        self.with_groups(|g| {
            g.leave(conn);
            g.room_of.insert(conn, room.clone());
            g.members.entry(room.clone()).or_default().insert(conn);
        });
        debug!("Connection subscribed");
    }

    /// Removes `conn` from its broadcast group, if any.
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, conn: ConnectionId) -> Option<RoomId> {
        self.with_groups(|g| g.leave(conn))
    }

    /// Drops the outbound queue of `conn`, leaving its group if still in one.
    #[instrument(skip(self))]
    pub fn unregister(&self, conn: ConnectionId) {
        self.with_groups(|g| {
            g.leave(conn);
            g.outbound.remove(&conn);
        });
        debug!("Connection unregistered");
    }

    /// Sends `message` to a single connection. Returns whether it was queued.
    #[instrument(skip(self, message))]
    pub fn send_to(&self, conn: ConnectionId, message: ServerMessage) -> bool {
        self.with_groups(|g| {
            g.outbound
                .get(&conn)
                .is_some_and(|tx| tx.send(message).is_ok())
        })
    }

    /// Sends `message` to every connection subscribed to `room`.
    ///
    /// A closed queue is skipped without affecting the others. Returns the
    /// number of connections the message was queued for.
    #[instrument(skip(self, message))]
    pub fn publish(&self, room: &RoomId, message: &ServerMessage) -> usize {
        self.with_groups(|g| {
            let Some(members) = g.members.get(room) else {
                trace!("No subscribers");
                return 0;
            };
            let mut delivered = 0;
            for conn in members {
                match g.outbound.get(conn) {
                    Some(tx) if tx.send(message.clone()).is_ok() => delivered += 1,
                    _ => debug!(connection = %conn, "Skipping closed connection"),
                }
            }
            delivered
        })
    }

    /// Number of connections subscribed to `room`.
    pub fn subscribers(&self, room: &RoomId) -> usize {
        self.with_groups(|g| g.members.get(room).map_or(0, HashSet::len))
    }
}
