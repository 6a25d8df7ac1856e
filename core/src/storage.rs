use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};

#[cfg(feature = "sqlite")]
use rusqlite::params;

/// Cache of archive passwords keyed by content hash, so a re-downloaded
/// archive skips the brute-force pass.
pub trait PasswordStore: Send + Sync {
    fn password_for(&self, hash: &str) -> CoreResult<Option<String>>;
    fn save_password(&mut self, filename: &str, hash: &str, password: &str) -> CoreResult<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    /// hash -> (filename, password)
    entries: HashMap<String, (String, String)>,
}

impl PasswordStore for MemoryStore {
    fn password_for(&self, hash: &str) -> CoreResult<Option<String>> {
        Ok(self
            .entries
            .get(hash)
            .map(|(_, password)| password.clone()))
    }

    fn save_password(&mut self, filename: &str, hash: &str, password: &str) -> CoreResult<()> {
        self.entries
            .insert(hash.to_string(), (filename.to_string(), password.to_string()));
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub struct SqliteStore {
    pub path: String,
}

#[cfg(feature = "sqlite")]
impl SqliteStore {
    pub fn new(path: impl Into<String>) -> CoreResult<Self> {
        let store = Self { path: path.into() };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> CoreResult<rusqlite::Connection> {
        rusqlite::Connection::open(&self.path)
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    fn init(&self) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rar_files (
                filename TEXT NOT NULL,
                hash TEXT PRIMARY KEY,
                password TEXT NOT NULL
            );
            ",
        )
        .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
impl PasswordStore for SqliteStore {
    fn password_for(&self, hash: &str) -> CoreResult<Option<String>> {
        use rusqlite::OptionalExtension;

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT password FROM rar_files WHERE hash = ?1")
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        stmt.query_row(params![hash], |row| row.get::<_, String>(0))
            .optional()
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    fn save_password(&mut self, filename: &str, hash: &str, password: &str) -> CoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "
            INSERT INTO rar_files (filename, hash, password) VALUES (?1, ?2, ?3)
            ON CONFLICT(hash) DO UPDATE SET
                filename=excluded.filename,
                password=excluded.password
            ",
            params![filename, hash, password],
        )
        .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(())
    }
}
