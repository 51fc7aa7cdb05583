//! Session save handlers
//!
//! A session runtime drives a handler through a fixed set of callbacks:
//! `open`, `read`/`write`/`destroy` any number of times, optionally `gc`, and
//! finally `close`. Return values follow the runtime's conventions: `read`
//! yields an empty string for an unknown session, and the mutating callbacks
//! report plain success flags rather than errors.

pub mod database;

pub use database::{DatabaseHandler, HandlerState};

use crate::error::Result;

/// Callbacks a session runtime invokes to delegate session storage
pub trait SaveHandler {
    /// Prepare the storage for use. `save_path` and `session_id` are passed
    /// through from the runtime; handlers may ignore them.
    fn open(&mut self, save_path: &str, session_id: &str) -> Result<bool>;

    /// Finish the request. Runs any cleanup requested by `gc`.
    fn close(&mut self) -> Result<bool>;

    /// Serialized session data, or an empty string when there is none
    fn read(&self, session_id: &str) -> String;

    /// Persist serialized session data
    fn write(&self, session_id: &str, data: &str) -> bool;

    /// Remove a session. Removing an unknown session succeeds.
    fn destroy(&self, session_id: &str) -> bool;

    /// Request removal of sessions not written in the last `max_lifetime` seconds
    fn gc(&mut self, max_lifetime: i64) -> bool;

    /// Whether this handler can be used in the current build
    fn is_supported() -> bool
    where
        Self: Sized;
}

/// Current wall-clock time in epoch seconds
pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
