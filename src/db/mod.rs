//! Database module for dbsession
//!
//! Provides the SQLite connection the save handler stores session rows in.
//! The connection is opened by `connect()` and dropped by `disconnect()`, so one
//! `Database` can outlive several connect/disconnect cycles.

pub mod schema;
pub mod sessions;

use crate::config::DatabaseConfig;
use crate::error::{HandlerError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use sessions::SessionRecord;

/// Placeholder in table names that is replaced with the configured prefix
pub const PREFIX_PLACEHOLDER: &str = "#__";

/// Session database handle
pub struct Database {
    conn: Option<Connection>,
    path: PathBuf,
    /// Resolved table name, unquoted
    table: String,
    busy_timeout: Duration,
}

impl Database {
    /// Create a handle for the database at `db_path`. No connection is made yet.
    pub fn new(db_path: impl Into<PathBuf>, table: &str, prefix: &str) -> Result<Self> {
        Ok(Database {
            conn: None,
            path: db_path.into(),
            table: resolve_table_name(table, prefix)?,
            busy_timeout: Duration::from_secs(5),
        })
    }

    /// Create a handle from the `[database]` config section
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let db = Database::new(config.path(), &config.table, &config.prefix)?;
        Ok(db.with_busy_timeout(config.busy_timeout()))
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Open the connection and make sure the session table exists.
    /// Does nothing if already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&self.path).map_err(|e| self.connection_error(e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| self.connection_error(e))?;
        schema::init_db(&conn, &self.table).map_err(|e| self.connection_error(e))?;

        tracing::debug!(
            "Connected to session database {} (table {})",
            self.path.display(),
            self.table
        );
        self.conn = Some(conn);
        Ok(())
    }

    /// Close the connection. Does nothing if not connected.
    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| self.connection_error(e))?;
            tracing::debug!("Disconnected from session database {}", self.path.display());
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Get the live connection
    pub fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(HandlerError::NotConnected)
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved session table name (unquoted)
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Session table name quoted for use in SQL
    pub fn quoted_table(&self) -> String {
        quote_name(&self.table)
    }

    fn connection_error(&self, source: rusqlite::Error) -> HandlerError {
        HandlerError::Connection {
            path: self.path.clone(),
            source,
        }
    }
}

/// Replace the `#__` placeholder with `prefix` and validate the result
pub fn resolve_table_name(table: &str, prefix: &str) -> Result<String> {
    let resolved = table.replace(PREFIX_PLACEHOLDER, prefix);
    if resolved.trim().is_empty() {
        return Err(HandlerError::InvalidTableName(format!(
            "{:?} resolves to an empty name",
            table
        )));
    }
    if resolved.contains('\0') {
        return Err(HandlerError::InvalidTableName(format!(
            "{:?} contains a NUL byte",
            resolved
        )));
    }
    Ok(resolved)
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("sessions.db"), "#__session", "app_").unwrap()
    }

    #[test]
    fn test_resolve_table_name() {
        assert_eq!(resolve_table_name("#__session", "jos_").unwrap(), "jos_session");
        assert_eq!(resolve_table_name("#__session", "").unwrap(), "session");
        assert_eq!(resolve_table_name("sessions", "jos_").unwrap(), "sessions");
        assert!(matches!(
            resolve_table_name("#__", ""),
            Err(HandlerError::InvalidTableName(_))
        ));
    }

    #[test]
    fn test_quote_name() {
        assert_eq!(quote_name("session"), "\"session\"");
        assert_eq!(quote_name("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_conn_requires_connect() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_db(&dir);
        assert!(!db.is_connected());
        assert!(matches!(db.conn(), Err(HandlerError::NotConnected)));
    }

    #[test]
    fn test_connect_creates_table_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = temp_db(&dir);

        db.connect().unwrap();
        db.connect().unwrap();
        assert!(db.is_connected());

        let count: i64 = db
            .conn()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [db.table()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_disconnect_then_reconnect_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = temp_db(&dir);

        db.connect().unwrap();
        db.upsert_data("abc", "payload", 100).unwrap();
        db.disconnect().unwrap();
        assert!(!db.is_connected());
        db.disconnect().unwrap();

        db.connect().unwrap();
        assert_eq!(db.load_data("abc").unwrap().as_deref(), Some("payload"));
    }

    #[test]
    fn test_connect_failure_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let mut db = Database::new(dir.path(), "#__session", "").unwrap();
        assert!(matches!(
            db.connect(),
            Err(HandlerError::Connection { .. })
        ));
        assert!(!db.is_connected());
    }
}
