//! Error types for dbsession

use std::path::PathBuf;
use thiserror::Error;

/// Handler error type
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Connecting to or disconnecting from the session database failed
    #[error("Connection error ({}): {source}", .path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A query was issued without a live connection
    #[error("Database is not connected")]
    NotConnected,

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// The delete performed by close() for a pending gc() failed
    #[error("Deferred garbage collection failed (cutoff {cutoff}): {source}")]
    DeferredGc {
        cutoff: i64,
        #[source]
        source: Box<HandlerError>,
    },

    /// The handler was used after close()
    #[error("Session handler is closed")]
    Closed,

    /// The capability probe rejected this handler
    #[error("Session handler not supported: {0}")]
    Unsupported(String),

    /// Table name could not be resolved to a usable identifier
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias for handler operations
pub type Result<T> = std::result::Result<T, HandlerError>;
