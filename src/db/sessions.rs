//! Row-level queries on the session table

use super::Database;
use crate::error::Result;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Row};
use serde::Serialize;

/// One persisted session row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub data: String,
    /// Epoch seconds of the last write
    pub time: i64,
}

/// Decode the `data` column. TEXT and BLOB are both accepted as long as the
/// bytes are UTF-8; NULL reads as an empty string.
fn payload_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(String::new()),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        ValueRef::Blob(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e))),
        ValueRef::Integer(i) => Ok(i.to_string()),
        ValueRef::Real(f) => Ok(f.to_string()),
    }
}

impl Database {
    /// Fetch the payload stored for `session_id`.
    /// A NULL payload reads as an empty string.
    pub fn load_data(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!(
                "SELECT \"data\" FROM {} WHERE \"session_id\" = ?1",
                self.quoted_table()
            ),
            [session_id],
            |row| payload_at(row, 0),
        );

        match result {
            Ok(data) => Ok(Some(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the full row for `session_id`
    pub fn get_record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!(
                "SELECT \"session_id\", \"data\", \"time\" FROM {} WHERE \"session_id\" = ?1",
                self.quoted_table()
            ),
            [session_id],
            |row| {
                Ok(SessionRecord {
                    session_id: row.get(0)?,
                    data: payload_at(row, 1)?,
                    time: row.get(2)?,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Update an existing row. Returns the number of rows changed (0 when the
    /// session has no row). `time` never moves backwards.
    pub fn update_data(&self, session_id: &str, data: &str, time: i64) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET \"data\" = ?2, \"time\" = MAX(\"time\", ?3)
                 WHERE \"session_id\" = ?1",
                self.quoted_table()
            ),
            params![session_id, data, time],
        )?;
        Ok(changed)
    }

    /// Insert the row, or update it if `session_id` already exists.
    /// `time` never moves backwards.
    pub fn upsert_data(&self, session_id: &str, data: &str, time: i64) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            &format!(
                "INSERT INTO {} (\"session_id\", \"data\", \"time\") VALUES (?1, ?2, ?3)
                 ON CONFLICT(\"session_id\") DO UPDATE SET
                    \"data\" = excluded.\"data\",
                    \"time\" = MAX(\"time\", excluded.\"time\")",
                self.quoted_table()
            ),
            params![session_id, data, time],
        )?;
        Ok(changed)
    }

    /// Delete the row for `session_id`. Returns the number of rows removed.
    pub fn delete_session(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!(
                "DELETE FROM {} WHERE \"session_id\" = ?1",
                self.quoted_table()
            ),
            [session_id],
        )?;
        Ok(removed)
    }

    /// Delete every row last written before `cutoff`
    pub fn delete_expired(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE \"time\" < ?1", self.quoted_table()),
            [cutoff],
        )?;
        Ok(removed)
    }

    /// All rows, most recently written first
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT \"session_id\", \"data\", \"time\" FROM {}
             ORDER BY \"time\" DESC, \"session_id\"",
            self.quoted_table()
        ))?;

        let records = stmt
            .query_map([], |row| {
                Ok(SessionRecord {
                    session_id: row.get(0)?,
                    data: payload_at(row, 1)?,
                    time: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_db(dir: &tempfile::TempDir) -> Database {
        let mut db = Database::new(dir.path().join("sessions.db"), "#__session", "").unwrap();
        db.connect().unwrap();
        db
    }

    #[test]
    fn test_update_data_skips_missing_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        assert_eq!(db.update_data("missing", "x", 10).unwrap(), 0);
        assert!(db.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.upsert_data("s", "first", 10).unwrap();
        db.upsert_data("s", "second", 20).unwrap();

        let record = db.get_record("s").unwrap().unwrap();
        assert_eq!(record.data, "second");
        assert_eq!(record.time, 20);
        assert_eq!(db.list_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_time_is_never_lowered() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.upsert_data("s", "a", 50).unwrap();
        db.upsert_data("s", "b", 40).unwrap();
        assert_eq!(db.get_record("s").unwrap().unwrap().time, 50);

        db.update_data("s", "c", 30).unwrap();
        let record = db.get_record("s").unwrap().unwrap();
        assert_eq!(record.data, "c");
        assert_eq!(record.time, 50);
    }

    #[test]
    fn test_null_data_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO session (session_id, data, time) VALUES ('n', NULL, 1)",
                [],
            )
            .unwrap();

        assert_eq!(db.load_data("n").unwrap().as_deref(), Some(""));
        assert_eq!(db.load_data("other").unwrap(), None);
    }

    #[test]
    fn test_blob_data_reads_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO session (session_id, data, time) VALUES ('b', X'68656c6c6f', 1)",
                [],
            )
            .unwrap();

        assert_eq!(db.load_data("b").unwrap().as_deref(), Some("hello"));
        assert_eq!(db.get_record("b").unwrap().unwrap().data, "hello");
        assert_eq!(db.list_sessions().unwrap()[0].data, "hello");
    }

    #[test]
    fn test_invalid_utf8_blob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.conn()
            .unwrap()
            .execute(
                "INSERT INTO session (session_id, data, time) VALUES ('bad', X'ff', 1)",
                [],
            )
            .unwrap();

        assert!(db.load_data("bad").is_err());
    }

    #[test]
    fn test_delete_expired_uses_strict_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.upsert_data("old", "x", 99).unwrap();
        db.upsert_data("edge", "x", 100).unwrap();
        db.upsert_data("new", "x", 101).unwrap();

        assert_eq!(db.delete_expired(100).unwrap(), 1);

        let ids: Vec<String> = db
            .list_sessions()
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "edge".to_string()]);
    }

    #[test]
    fn test_delete_session_counts_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = connected_db(&dir);

        db.upsert_data("s", "x", 1).unwrap();
        assert_eq!(db.delete_session("s").unwrap(), 1);
        assert_eq!(db.delete_session("s").unwrap(), 0);
    }
}
