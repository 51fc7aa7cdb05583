//! dbsession - database-backed session save handler
//!
//! This crate stores session runtime state in a single SQLite table:
//! - `SaveHandler`: the open/close/read/write/destroy/gc callback contract
//! - `DatabaseHandler`: the table-backed implementation, with garbage
//!   collection deferred from `gc()` to `close()`
//! - `Database`: connection, schema and row queries for the session table
//!
//! # Usage
//!
//! ```no_run
//! use dbsession::{Config, DatabaseHandler, SaveHandler};
//!
//! # fn main() -> dbsession::Result<()> {
//! let config = Config::load_or_default(Config::default_path());
//! let mut handler = DatabaseHandler::from_config(&config)?;
//!
//! handler.open("", "abc123")?;
//! let data = handler.read("abc123");
//! handler.write("abc123", &format!("{}visits|i:1;", data));
//! handler.gc(config.session.max_lifetime_secs);
//! handler.close()?; // expired sessions are removed here
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handler;

// Re-export main types for convenience
pub use config::Config;
pub use db::{Database, SessionRecord};
pub use error::{HandlerError, Result};
pub use handler::{DatabaseHandler, HandlerState, SaveHandler};
