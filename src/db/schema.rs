//! SQLite schema for the session table
//!
//! One row per session: `session_id` key, opaque `data` payload and the
//! `time` of the last write in epoch seconds.

use super::quote_name;
use rusqlite::{Connection, Result};

/// Create the session table and its `time` index if they are missing
pub fn init_db(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (
                \"session_id\" TEXT NOT NULL PRIMARY KEY,
                \"data\" TEXT,
                \"time\" INTEGER NOT NULL DEFAULT 0
            )",
            quote_name(table)
        ),
        [],
    )?;

    // Garbage collection scans by time
    conn.execute(
        &format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (\"time\")",
            quote_name(&format!("{}_time_idx", table)),
            quote_name(table)
        ),
        [],
    )?;

    Ok(())
}
