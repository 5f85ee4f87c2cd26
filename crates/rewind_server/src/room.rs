//! Room projection and its pure transitions.
//!
//! A [`Room`] is the cached "current" view of one game: roster, board, whose
//! turn it is, status and winner. Every transition here is a pure function
//! from one `Room` to the next; persisting the result is the coordinator's
//! job.

use chrono::{NaiveDateTime, Utc};
use derive_getters::Getters;
use rand::Rng;
use rewind_board::{Board, Mark, Outcome, evaluate};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::SessionError;
use crate::move_log::Move;

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of generated room identifiers.
pub const ROOM_ID_LEN: usize = 6;

/// Maximum number of seated players.
pub const SEATS: usize = 2;

/// Draws `len` characters from `[0-9A-Z]`.
pub(crate) fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// Short opaque room identifier.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(random_token(ROOM_ID_LEN))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status of a room.
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
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomStatus {
    /// Fewer than two players seated.
    Waiting,
    /// Two players seated and the game is not over.
    Playing,
    /// The position on the board is won or drawn.
    Finished,
}

/// Result of a finished game: a mark, or `"draw"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Winner {
    /// A mark completed a line.
    #[display("{_0}")]
    Mark(Mark),
    /// The board filled without a line.
    #[display("draw")]
    Draw,
}

impl std::str::FromStr for Winner {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draw" => Ok(Winner::Draw),
            other => other.parse::<Mark>().map(Winner::Mark),
        }
    }
}

impl Serialize for Winner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Winner {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Current projection of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub(crate) id: RoomId,
    pub(crate) players: Vec<String>,
    pub(crate) board: Board,
    pub(crate) current_player: Option<String>,
    pub(crate) game_status: RoomStatus,
    pub(crate) winner: Option<Winner>,
    /// Sequence number of the move the board reflects; 0 for the start position.
    pub(crate) cursor: u32,
    pub(crate) created_at: NaiveDateTime,
}

impl Room {
    /// Creates an empty waiting room with a freshly generated identifier.
    #[instrument]
    pub fn create() -> Self {
        Self::with_id(RoomId::generate())
    }

    /// Creates an empty waiting room with the given identifier.
    pub fn with_id(id: RoomId) -> Self {
        Self {
            id,
            players: Vec::new(),
            board: Board::new(),
            current_player: None,
            game_status: RoomStatus::Waiting,
            winner: None,
            cursor: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Returns the seat index of `label`, if seated.
    pub fn seat_of(&self, label: &str) -> Option<usize> {
        self.players.iter().position(|p| p == label)
    }

    /// Returns the mark assigned to `label` by seat order.
    pub fn mark_of(&self, label: &str) -> Option<Mark> {
        self.seat(label).map(|(_, mark)| mark)
    }

    /// Returns the seat index and mark of `label`.
    pub fn seat(&self, label: &str) -> Option<(usize, Mark)> {
        let index = self.seat_of(label)?;
        Mark::for_seat(index).map(|mark| (index, mark))
    }

    /// Returns the label seated with `mark`.
    pub fn player_for(&self, mark: Mark) -> Option<&String> {
        self.players.get(mark.seat())
    }

    /// Seats `label`.
    ///
    /// Seating a label that is already present returns the room unchanged.
    /// The second seat starts the game with the first-seated player to move.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RoomFull`] if both seats are taken by others.
    #[instrument(skip(self), fields(room_id = %self.id))]
    pub fn add_player(&self, label: &str) -> Result<Room, SessionError> {
        if self.seat_of(label).is_some() {
            debug!("Label already seated");
            return Ok(self.clone());
        }
        if self.players.len() >= SEATS {
            return Err(SessionError::RoomFull);
        }

        let mut next = self.clone();
        next.players.push(label.to_string());
        if next.players.len() == SEATS && next.game_status == RoomStatus::Waiting {
            next.game_status = RoomStatus::Playing;
            next.current_player = next.players.first().cloned();
        }
        Ok(next)
    }

    /// Advances the projection past an accepted move.
    #[instrument(skip(self, mv), fields(room_id = %self.id, move_number = *mv.sequence_number()))]
    pub fn record_move(&self, mv: &Move) -> Room {
        let mut next = self.clone();
        next.board = *mv.board_after();
        next.cursor = *mv.sequence_number();

        match evaluate(&next.board) {
            Outcome::InProgress => {
                next.game_status = RoomStatus::Playing;
                next.winner = None;
                next.current_player = next.player_for(mv.mover().opponent()).cloned();
            }
            outcome => next.finish(outcome),
        }
        next
    }

    /// Points the projection at a historical board without touching the log.
    ///
    /// Turn parity comes from the ply of `board` (even: first seat to move).
    /// For a log without branches the ply equals `sequence_number`.
    #[instrument(skip(self, board), fields(room_id = %self.id))]
    pub fn restore_to(&self, board: Board, sequence_number: u32) -> Room {
        let mut next = self.clone();
        next.board = board;
        next.cursor = sequence_number;

        match evaluate(&board) {
            Outcome::InProgress if next.players.len() < SEATS => {
                next.game_status = RoomStatus::Waiting;
                next.winner = None;
                next.current_player = None;
            }
            Outcome::InProgress => {
                let seat = board.marks() % SEATS;
                next.game_status = RoomStatus::Playing;
                next.winner = None;
                next.current_player = next.players.get(seat).cloned();
            }
            outcome => next.finish(outcome),
        }
        next
    }

    fn finish(&mut self, outcome: Outcome) {
        self.game_status = RoomStatus::Finished;
        self.current_player = None;
        self.winner = match outcome {
            Outcome::Won { mark, .. } => Some(Winner::Mark(mark)),
            Outcome::Draw => Some(Winner::Draw),
            Outcome::InProgress => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_log::NewMove;
    use rewind_board::apply_move;

    fn seated(labels: &[&str]) -> Room {
        labels
            .iter()
            .fold(Room::with_id("ROOM01".into()), |room, label| {
                room.add_player(label).unwrap()
            })
    }

    fn play(room: Room, positions: &[usize]) -> (Room, Vec<Move>) {
        let mut room = room;
        let mut log: Vec<Move> = Vec::new();
        for &pos in positions {
            let label = room.current_player().clone().unwrap();
            let mark = room.mark_of(&label).unwrap();
            let board = apply_move(room.board(), pos, mark).unwrap();
            let mv = Move::next(
                log.last(),
                NewMove::new(room.id().clone(), mark, pos as u8, *room.cursor(), board),
            );
            room = room.record_move(&mv);
            log.push(mv);
        }
        (room, log)
    }

    #[test]
    fn test_room_id_shape() {
        let id = RoomId::generate();
        assert_eq!(id.as_str().len(), ROOM_ID_LEN);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_create_is_waiting_and_empty() {
        let room = Room::create();
        assert_eq!(*room.game_status(), RoomStatus::Waiting);
        assert!(room.players().is_empty());
        assert_eq!(*room.board(), Board::new());
        assert_eq!(*room.current_player(), None);
        assert_eq!(*room.winner(), None);
    }

    #[test]
    fn test_first_player_keeps_waiting() {
        let room = seated(&["alice"]);
        assert_eq!(*room.game_status(), RoomStatus::Waiting);
        assert_eq!(room.players(), &vec!["alice".to_string()]);
    }

    #[test]
    fn test_second_player_starts_game() {
        let room = seated(&["alice", "bob"]);
        assert_eq!(*room.game_status(), RoomStatus::Playing);
        assert_eq!(room.current_player().as_deref(), Some("alice"));
        assert_eq!(room.mark_of("alice"), Some(Mark::X));
        assert_eq!(room.mark_of("bob"), Some(Mark::O));
    }

    #[test]
    fn test_add_player_is_idempotent() {
        let room = seated(&["alice", "bob"]);
        let again = room.add_player("alice").unwrap();
        assert_eq!(again, room);
    }

    #[test]
    fn test_third_player_rejected() {
        let room = seated(&["alice", "bob"]);
        assert!(matches!(
            room.add_player("carol"),
            Err(SessionError::RoomFull)
        ));
    }

    #[test]
    fn test_record_move_flips_turn() {
        let (room, _) = play(seated(&["alice", "bob"]), &[4]);
        assert_eq!(room.board().get(4).and_then(|s| s.mark()), Some(Mark::X));
        assert_eq!(room.current_player().as_deref(), Some("bob"));
        assert_eq!(*room.cursor(), 1);
    }

    #[test]
    fn test_record_move_detects_win() {
        let (room, _) = play(seated(&["alice", "bob"]), &[0, 4, 1, 5, 2]);
        assert_eq!(*room.game_status(), RoomStatus::Finished);
        assert_eq!(*room.winner(), Some(Winner::Mark(Mark::X)));
        assert_eq!(*room.current_player(), None);
    }

    #[test]
    fn test_record_move_detects_draw() {
        let (room, _) = play(seated(&["alice", "bob"]), &[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(*room.game_status(), RoomStatus::Finished);
        assert_eq!(*room.winner(), Some(Winner::Draw));
    }

    #[test]
    fn test_restore_to_start_reopens_finished_game() {
        let (room, _) = play(seated(&["alice", "bob"]), &[0, 4, 1, 5, 2]);
        let restored = room.restore_to(Board::new(), 0);
        assert_eq!(*restored.game_status(), RoomStatus::Playing);
        assert_eq!(restored.current_player().as_deref(), Some("alice"));
        assert_eq!(*restored.winner(), None);
        assert_eq!(*restored.cursor(), 0);
    }

    #[test]
    fn test_restore_to_odd_move_gives_second_seat() {
        let (room, log) = play(seated(&["alice", "bob"]), &[0, 4, 1]);
        let restored = room.restore_to(*log[0].board_after(), 1);
        assert_eq!(restored.current_player().as_deref(), Some("bob"));
        assert_eq!(*restored.game_status(), RoomStatus::Playing);
    }

    #[test]
    fn test_restore_with_one_seat_waits() {
        let room = seated(&["alice"]);
        let restored = room.restore_to(Board::new(), 0);
        assert_eq!(*restored.game_status(), RoomStatus::Waiting);
        assert_eq!(*restored.current_player(), None);
    }

    #[test]
    fn test_winner_strings() {
        assert_eq!(Winner::Draw.to_string(), "draw");
        assert_eq!("O".parse::<Winner>().unwrap(), Winner::Mark(Mark::O));
        assert!("nobody".parse::<Winner>().is_err());
        assert_eq!(serde_json::to_string(&Winner::Draw).unwrap(), r#""draw""#);
        assert_eq!(Winner::Mark(Mark::X).to_string(), "X");
        assert_eq!(
            serde_json::from_str::<Winner>(r#""X""#).unwrap(),
            Winner::Mark(Mark::X)
        );
        assert!(serde_json::from_str::<Winner>(r#""x""#).is_err());
    }

    #[test]
    fn test_room_json_is_camel_case() {
        let room = seated(&["alice", "bob"]);
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["gameStatus"], "playing");
        assert_eq!(json["currentPlayer"], "alice");
        assert_eq!(json["players"], serde_json::json!(["alice", "bob"]));
        assert!(json["winner"].is_null());
    }
}
