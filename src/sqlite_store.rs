use std::sync::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use crate::challenge::Challenge;
use crate::matches::Match;
use crate::teams::{Team, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    LockError,
}

const TABLES: [&str; 4] = ["challenges", "teams", "users", "matches"];

/// SQLite-backed persistence. Every entity is stored as one JSON document keyed by id.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path. `:memory:` gives a throwaway store.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        for table in TABLES {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );"
            ))?;
        }
        tracing::info!(path, "sqlite store opened");
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn load_all<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;
        let mut stmt = conn.prepare(&format!("SELECT data FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(serde_json::from_str(&row?)?);
        }
        Ok(items)
    }

    fn upsert<T: Serialize>(&self, table: &str, id: Uuid, item: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(item)?;
        let conn = self.conn.lock().map_err(|_| StorageError::LockError)?;
        conn.execute(
            &format!("INSERT OR REPLACE INTO {table} (id, data) VALUES (?1, ?2)"),
            rusqlite::params![id.to_string(), json],
        )?;
        Ok(())
    }

    pub fn load_challenges(&self) -> Result<Vec<Challenge>, StorageError> {
        self.load_all("challenges")
    }

    pub fn save_challenge(&self, challenge: &Challenge) -> Result<(), StorageError> {
        self.upsert("challenges", *challenge.get_id(), challenge)
    }

    pub fn load_teams(&self) -> Result<Vec<Team>, StorageError> {
        self.load_all("teams")
    }

    pub fn save_team(&self, team: &Team) -> Result<(), StorageError> {
        self.upsert("teams", team.id, team)
    }

    pub fn load_users(&self) -> Result<Vec<UserRecord>, StorageError> {
        self.load_all("users")
    }

    pub fn save_user(&self, record: &UserRecord) -> Result<(), StorageError> {
        self.upsert("users", record.user.id, record)
    }

    pub fn load_matches(&self) -> Result<Vec<Match>, StorageError> {
        self.load_all("matches")
    }

    pub fn save_match(&self, game: &Match) -> Result<(), StorageError> {
        self.upsert("matches", game.id, game)
    }
}
