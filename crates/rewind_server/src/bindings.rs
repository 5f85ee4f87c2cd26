//! Connection ↔ participant bindings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use derive_getters::Getters;
use tracing::{debug, instrument};

use crate::gateway::ConnectionId;
use crate::room::RoomId;

/// The seat a connection speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters)]
pub struct Binding {
    room_id: RoomId,
    label: String,
}

#[derive(Debug, Default)]
struct BindingTable {
    by_connection: HashMap<ConnectionId, Binding>,
    by_seat: HashMap<Binding, ConnectionId>,
}

/// Bidirectional map between live connections and `(room, label)` seats.
///
/// A seat has at most one live connection: binding a seat that is already
/// bound moves it to the new connection. Entries are not persisted.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBindings {
    table: Arc<Mutex<BindingTable>>,
}

impl ConnectionBindings {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<T>(&self, f: impl FnOnce(&mut BindingTable) -> T) -> T {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut table)
    }

    /// Binds `conn` to `label` in `room_id`.
    ///
    /// Returns the connection that previously held the seat, if it was a
    /// different one.
    #[instrument(skip(self))]
    pub fn bind(&self, conn: ConnectionId, room_id: &RoomId, label: &str) -> Option<ConnectionId> {
        let binding = Binding {
            room_id: room_id.clone(),
            label: label.to_string(),
        };
        self.with_table(|t| {
            if let Some(old) = t.by_connection.remove(&conn) {
                t.by_seat.remove(&old);
            }
            let displaced = t.by_seat.insert(binding.clone(), conn).filter(|c| *c != conn);
            if let Some(stale) = displaced {
                debug!(stale = %stale, "Seat moved to new connection");
                t.by_connection.remove(&stale);
            }
            t.by_connection.insert(conn, binding);
            displaced
        })
    }

    /// Returns the seat bound to `conn`.
    pub fn binding(&self, conn: ConnectionId) -> Option<Binding> {
        self.with_table(|t| t.by_connection.get(&conn).cloned())
    }

    /// Returns the connection currently speaking for `label` in `room_id`.
    pub fn connection_for(&self, room_id: &RoomId, label: &str) -> Option<ConnectionId> {
        let seat = Binding {
            room_id: room_id.clone(),
            label: label.to_string(),
        };
        self.with_table(|t| t.by_seat.get(&seat).copied())
    }

    /// Removes the binding of `conn`, returning it.
    #[instrument(skip(self))]
    pub fn unbind(&self, conn: ConnectionId) -> Option<Binding> {
        self.with_table(|t| {
            let binding = t.by_connection.remove(&conn)?;
            t.by_seat.remove(&binding);
            Some(binding)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup_both_ways() {
        let bindings = ConnectionBindings::new();
        let conn = ConnectionId::next();
        let room: RoomId = "ROOM01".into();
        assert_eq!(bindings.bind(conn, &room, "alice"), None);

        let binding = bindings.binding(conn).unwrap();
        assert_eq!(binding.label(), "alice");
        assert_eq!(binding.room_id(), &room);
        assert_eq!(bindings.connection_for(&room, "alice"), Some(conn));
    }

    #[test]
    fn test_reconnect_displaces_stale_connection() {
        let bindings = ConnectionBindings::new();
        let (old, new) = (ConnectionId::next(), ConnectionId::next());
        let room: RoomId = "ROOM01".into();
        bindings.bind(old, &room, "alice");

        assert_eq!(bindings.bind(new, &room, "alice"), Some(old));
        assert_eq!(bindings.binding(old), None);
        assert_eq!(bindings.connection_for(&room, "alice"), Some(new));
    }

    #[test]
    fn test_rebinding_same_connection_is_quiet() {
        let bindings = ConnectionBindings::new();
        let conn = ConnectionId::next();
        let room: RoomId = "ROOM01".into();
        bindings.bind(conn, &room, "alice");
        assert_eq!(bindings.bind(conn, &room, "alice"), None);
    }

    #[test]
    fn test_switching_seat_frees_old_seat() {
        let bindings = ConnectionBindings::new();
        let conn = ConnectionId::next();
        bindings.bind(conn, &"ROOM01".into(), "alice");
        bindings.bind(conn, &"ROOM02".into(), "alice");
        assert_eq!(bindings.connection_for(&"ROOM01".into(), "alice"), None);
        assert_eq!(bindings.connection_for(&"ROOM02".into(), "alice"), Some(conn));
    }

    #[test]
    fn test_same_label_in_different_rooms_is_distinct() {
        let bindings = ConnectionBindings::new();
        let (a, b) = (ConnectionId::next(), ConnectionId::next());
        bindings.bind(a, &"ROOM01".into(), "alice");
        assert_eq!(bindings.bind(b, &"ROOM02".into(), "alice"), None);
        assert!(bindings.binding(a).is_some());
    }

    #[test]
    fn test_unbind_clears_both_directions() {
        let bindings = ConnectionBindings::new();
        let conn = ConnectionId::next();
        bindings.bind(conn, &"ROOM01".into(), "alice");
        assert!(bindings.unbind(conn).is_some());
        assert_eq!(bindings.binding(conn), None);
        assert_eq!(bindings.connection_for(&"ROOM01".into(), "alice"), None);
        assert_eq!(bindings.unbind(conn), None);
    }
}
