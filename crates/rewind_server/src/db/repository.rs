//! SQLite-backed [`GameStore`].

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::db::models::RoomChanges;
use crate::db::{DbError, MoveRecord, RoomRecord, schema};
use crate::move_log::Move;
use crate::room::{Room, RoomId};
use crate::store::GameStore;

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Store backed by a SQLite database file.
///
/// Each operation opens its own connection on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Creates a store for the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::new("Database path is empty"));
        }
        info!(path = %db_path, "Creating SqliteStore");
        Ok(Self { db_path })
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS)).execute(&mut conn)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        Ok(conn)
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Runs `f` with a fresh connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, DbError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connection()?;
            f(&mut conn)
        })
        .await?
    }
}

fn load_moves(conn: &mut SqliteConnection, room_id: &str) -> Result<Vec<Move>, DbError> {
    schema::movements::table
        .filter(schema::movements::room_id.eq(room_id))
        .order(schema::movements::move_number.asc())
        .select(MoveRecord::as_select())
        .load(conn)?
        .into_iter()
        .map(Move::try_from)
        .collect()
}

#[async_trait]
impl GameStore for SqliteStore {
    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    async fn insert_room(&self, room: &Room) -> Result<bool, DbError> {
        let record = RoomRecord::try_from(room)?;
        self.blocking(move |conn| {
            match diesel::insert_into(schema::rooms::table)
                .values(&record)
                .execute(conn)
            {
                Ok(_) => Ok(true),
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    debug!("Room id already taken");
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn room(&self, id: &RoomId) -> Result<Option<Room>, DbError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            schema::rooms::table
                .find(&id)
                .select(RoomRecord::as_select())
                .first(conn)
                .optional()?
                .map(Room::try_from)
                .transpose()
        })
        .await
    }

    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    async fn update_room(&self, room: &Room) -> Result<(), DbError> {
        let id = room.id().to_string();
        let changes = RoomChanges::try_from(room)?;
        self.blocking(move |conn| {
            let updated = diesel::update(schema::rooms::table.find(&id))
                .set(&changes)
                .execute(conn)?;
            if updated == 0 {
                return Err(DbError::new(format!("Room {} does not exist", id)));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, mv, room), fields(room_id = %room.id(), move_number = *mv.sequence_number()))]
    async fn append_move(&self, mv: &Move, room: &Room) -> Result<(), DbError> {
        let id = room.id().to_string();
        let record = MoveRecord::try_from(mv)?;
        let changes = RoomChanges::try_from(room)?;
        self.blocking(move |conn| {
            conn.immediate_transaction(|conn| {
                let latest: Option<i32> = schema::movements::table
                    .filter(schema::movements::room_id.eq(&id))
                    .select(diesel::dsl::max(schema::movements::move_number))
                    .first(conn)?;
                let expected = latest.unwrap_or(0) + 1;
                if *record.move_number() != expected {
                    return Err(DbError::new(format!(
                        "Move number {} conflicts, expected {}",
                        record.move_number(),
                        expected
                    )));
                }

                diesel::insert_into(schema::movements::table)
                    .values(&record)
                    .execute(conn)?;
                let updated = diesel::update(schema::rooms::table.find(&id))
                    .set(&changes)
                    .execute(conn)?;
                if updated == 0 {
                    return Err(DbError::new(format!("Room {} does not exist", id)));
                }
                Ok(())
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn moves(&self, id: &RoomId) -> Result<Vec<Move>, DbError> {
        let id = id.to_string();
        self.blocking(move |conn| load_moves(conn, &id)).await
    }

    #[instrument(skip(self))]
    async fn latest_move(&self, id: &RoomId) -> Result<Option<Move>, DbError> {
        let id = id.to_string();
        self.blocking(move |conn| {
            schema::movements::table
                .filter(schema::movements::room_id.eq(&id))
                .order(schema::movements::move_number.desc())
                .select(MoveRecord::as_select())
                .first(conn)
                .optional()?
                .map(Move::try_from)
                .transpose()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn move_at(&self, id: &RoomId, sequence_number: u32) -> Result<Option<Move>, DbError> {
        let id = id.to_string();
        let Ok(number) = i32::try_from(sequence_number) else {
            return Ok(None);
        };
        self.blocking(move |conn| {
            schema::movements::table
                .filter(schema::movements::room_id.eq(&id))
                .filter(schema::movements::move_number.eq(number))
                .select(MoveRecord::as_select())
                .first(conn)
                .optional()?
                .map(Move::try_from)
                .transpose()
        })
        .await
    }
}
