//! Token Database
//!
//! SQLite key/value table holding the session tokens between runs.

use crate::auth::{TokenPair, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Could not determine app data directory")]
    NoDataDir,
}

// ============================================================================
// DATABASE
// ============================================================================

/// SQLite-backed token store (thread-safe through the Mutex)
pub struct TokenDatabase {
    conn: Mutex<Connection>,
}

impl TokenDatabase {
    /// Opens `flow.db` in `data_dir`, or in the platform data dir when `None`
    pub fn open(data_dir: Option<&Path>) -> Result<Self, DatabaseError> {
        let db_path = match data_dir {
            Some(dir) => dir.join("flow.db"),
            None => Self::default_database_path()?,
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
            // Tokens are credentials: owner-only access on directories we create
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = std::fs::metadata(parent)?.permissions();
                perms.set_mode(0o700);
                std::fs::set_permissions(parent, perms)?;
            }
        }

        tracing::info!("Opening token database at {:?}", db_path);

        let db = Self {
            conn: Mutex::new(Connection::open(&db_path)?),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn default_database_path() -> Result<PathBuf, DatabaseError> {
        let proj_dirs =
            directories::ProjectDirs::from("edu", "flow", "flow-client").ok_or(DatabaseError::NoDataDir)?;
        Ok(proj_dirs.data_dir().join("flow.db"))
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS local_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;
        Ok(())
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO local_storage (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl TokenStore for TokenDatabase {
    fn load(&self) -> Result<Option<TokenPair>, DatabaseError> {
        let access = self.get_item(ACCESS_TOKEN_KEY)?;
        let refresh = self.get_item(REFRESH_TOKEN_KEY)?;
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair { access, refresh }),
            _ => None,
        })
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), DatabaseError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for (key, value) in [
            (ACCESS_TOKEN_KEY, tokens.access.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh.as_str()),
        ] {
            tx.execute(
                r#"
                INSERT INTO local_storage (key, value)
                VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = datetime('now')
                "#,
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), DatabaseError> {
        self.remove_item(ACCESS_TOKEN_KEY)?;
        self.remove_item(REFRESH_TOKEN_KEY)
    }
}

// ============================================================================
// TESTS
// ============================================================================
