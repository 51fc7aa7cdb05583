//! Database-backed save handler
//!
//! Sessions live in a single table keyed by session id. Expired sessions are
//! not removed when the runtime calls `gc()`; the call only records a cutoff
//! and the delete runs in the next `close()`, so cleanup never happens in the
//! middle of a request.

use super::{now, SaveHandler};
use crate::config::{Config, DeferredGcErrors, WritePolicy};
use crate::db::Database;
use crate::error::{HandlerError, Result};

/// Upsert (`ON CONFLICT ... DO UPDATE`) needs SQLite 3.24.0
const MIN_SQLITE_VERSION: i32 = 3_024_000;

/// Lifecycle of a handler instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Unopened,
    Open,
    /// Terminal; a closed handler cannot be reopened
    Closed,
}

/// Save handler storing sessions in a database table.
///
/// One instance serves one request: construct, `open`, use, `close`, drop.
/// The pending garbage collection cutoff belongs to the instance and is never
/// shared with other requests.
pub struct DatabaseHandler {
    db: Database,
    state: HandlerState,
    /// Set by `gc()`, consumed by `close()`
    gc_cutoff: Option<i64>,
    /// Rows removed by the deferred delete in `close()`
    collected: Option<usize>,
    write_policy: WritePolicy,
    deferred_gc_errors: DeferredGcErrors,
}

impl DatabaseHandler {
    /// Wrap an injected database capability
    pub fn new(db: Database) -> Self {
        DatabaseHandler {
            db,
            state: HandlerState::Unopened,
            gc_cutoff: None,
            collected: None,
            write_policy: WritePolicy::default(),
            deferred_gc_errors: DeferredGcErrors::default(),
        }
    }

    /// Build a handler from configuration, refusing if the probe fails
    pub fn from_config(config: &Config) -> Result<Self> {
        if !Self::is_supported() {
            return Err(HandlerError::Unsupported(format!(
                "SQLite {} is older than 3.24.0",
                rusqlite::version()
            )));
        }

        let db = Database::from_config(&config.database)?;
        Ok(DatabaseHandler::new(db)
            .with_write_policy(config.session.write_policy)
            .with_deferred_gc_errors(config.session.deferred_gc_errors))
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn with_deferred_gc_errors(mut self, policy: DeferredGcErrors) -> Self {
        self.deferred_gc_errors = policy;
        self
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Cutoff waiting for the next `close()`, if `gc()` was called
    pub fn pending_gc_cutoff(&self) -> Option<i64> {
        self.gc_cutoff
    }

    /// Rows removed by the deferred delete, once `close()` has run one
    pub fn collected(&self) -> Option<usize> {
        self.collected
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Hand the database capability back to the caller
    pub fn into_database(self) -> Database {
        self.db
    }

    fn live_db(&self) -> Result<&Database> {
        match self.state {
            HandlerState::Closed => Err(HandlerError::Closed),
            _ => Ok(&self.db),
        }
    }

    /// Stored payload for `session_id`, empty if there is no row
    pub fn load(&self, session_id: &str) -> Result<String> {
        Ok(self.live_db()?.load_data(session_id)?.unwrap_or_default())
    }

    /// Store `data` under the configured write policy.
    /// Returns the number of rows changed.
    pub fn store(&self, session_id: &str, data: &str) -> Result<usize> {
        let db = self.live_db()?;
        let time = now();
        match self.write_policy {
            WritePolicy::Upsert => db.upsert_data(session_id, data, time),
            WritePolicy::UpdateOnly => {
                let changed = db.update_data(session_id, data, time)?;
                if changed == 0 {
                    tracing::debug!("No session row for {}, write not persisted", session_id);
                }
                Ok(changed)
            }
        }
    }

    /// Delete the row for `session_id`. Returns the number of rows removed.
    pub fn remove(&self, session_id: &str) -> Result<usize> {
        self.live_db()?.delete_session(session_id)
    }

    /// Run the delete requested by `gc()`, clearing the pending cutoff first
    fn collect_garbage(&mut self) -> Result<()> {
        let Some(cutoff) = self.gc_cutoff.take() else {
            return Ok(());
        };

        match self.db.delete_expired(cutoff) {
            Ok(removed) => {
                tracing::info!("Removed {} expired sessions (cutoff {})", removed, cutoff);
                self.collected = Some(removed);
                Ok(())
            }
            Err(source) => Err(HandlerError::DeferredGc {
                cutoff,
                source: Box::new(source),
            }),
        }
    }
}

/// Combine the deferred gc result with the final disconnect.
/// Disconnect failures always propagate; a gc failure propagates only under
/// `DeferredGcErrors::Propagate`, and wins when both fail.
fn close_outcome(
    collected: Result<()>,
    disconnected: Result<()>,
    policy: DeferredGcErrors,
) -> Result<bool> {
    match collected {
        Ok(()) => disconnected.map(|_| true),
        Err(e) => match policy {
            DeferredGcErrors::Propagate => {
                if let Err(disconnect_err) = disconnected {
                    tracing::warn!("Disconnect after failed gc also failed: {}", disconnect_err);
                }
                Err(e)
            }
            DeferredGcErrors::Log => {
                tracing::warn!("{}", e);
                disconnected.map(|_| true)
            }
        },
    }
}

impl SaveHandler for DatabaseHandler {
    fn open(&mut self, save_path: &str, session_id: &str) -> Result<bool> {
        if self.state == HandlerState::Closed {
            return Err(HandlerError::Closed);
        }

        tracing::debug!(
            "Opening session handler (save_path={:?}, session_id={:?})",
            save_path,
            session_id
        );
        self.db.connect()?;
        self.state = HandlerState::Open;
        Ok(true)
    }

    fn close(&mut self) -> Result<bool> {
        if self.state == HandlerState::Closed {
            return Ok(true);
        }

        let collected = self.collect_garbage();
        self.state = HandlerState::Closed;
        let disconnected = self.db.disconnect();

        close_outcome(collected, disconnected, self.deferred_gc_errors)
    }

    fn read(&self, session_id: &str) -> String {
        self.load(session_id).unwrap_or_else(|e| {
            tracing::warn!("Failed to read session {}: {}", session_id, e);
            String::new()
        })
    }

    fn write(&self, session_id: &str, data: &str) -> bool {
        match self.store(session_id, data) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to write session {}: {}", session_id, e);
                false
            }
        }
    }

    fn destroy(&self, session_id: &str) -> bool {
        match self.remove(session_id) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to destroy session {}: {}", session_id, e);
                false
            }
        }
    }

    fn gc(&mut self, max_lifetime: i64) -> bool {
        let cutoff = now().saturating_sub(max_lifetime);
        tracing::debug!("Deferring gc until close (cutoff {})", cutoff);
        self.gc_cutoff = Some(cutoff);
        true
    }

    fn is_supported() -> bool {
        rusqlite::version_number() >= MIN_SQLITE_VERSION
    }
}
