//! Configuration management for dbsession
//!
//! Loads settings from TOML file at ~/.dbsession/config.toml

use crate::error::{HandlerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Save handler behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Session database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (default: ~/.dbsession/sessions.db)
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Session table name. `#__` is replaced with `prefix`.
    #[serde(default = "default_table")]
    pub table: String,

    /// Table prefix substituted for `#__`
    #[serde(default)]
    pub prefix: String,

    /// How long a statement waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".dbsession").join("sessions.db"))
        .unwrap_or_else(|| PathBuf::from(".dbsession/sessions.db"))
}

fn default_table() -> String {
    "#__session".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl DatabaseConfig {
    /// Database path with ~ expanded
    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_db_path(),
            table: default_table(),
            prefix: String::new(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// How `write()` treats a session id with no stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Insert the row if it is missing, otherwise update it
    #[default]
    Upsert,
    /// Only update existing rows; a missing row is silently left missing
    UpdateOnly,
}

/// What `close()` does when the deferred garbage collection delete fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredGcErrors {
    /// Return the error from `close()`
    #[default]
    Propagate,
    /// Log the error and report success
    Log,
}

/// Save handler behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub write_policy: WritePolicy,

    #[serde(default)]
    pub deferred_gc_errors: DeferredGcErrors,

    /// Lifetime in seconds used by the CLI `gc` command when none is given
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: i64,
}

fn default_max_lifetime() -> i64 {
    1440 // 24 minutes, the usual session runtime default
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            write_policy: WritePolicy::default(),
            deferred_gc_errors: DeferredGcErrors::default(),
            max_lifetime_secs: default_max_lifetime(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(HandlerError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    /// Load configuration from file or use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".dbsession").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".dbsession/config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DBSESSION_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(prefix) = std::env::var("DBSESSION_TABLE_PREFIX") {
            self.database.prefix = prefix;
        }
        if let Ok(lifetime) = std::env::var("DBSESSION_MAX_LIFETIME") {
            if let Ok(lifetime) = lifetime.parse() {
                self.session.max_lifetime_secs = lifetime;
            }
        }
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = r##"# dbsession configuration

[database]
# SQLite database holding the session table
path = "~/.dbsession/sessions.db"

# Session table; "#__" is replaced with the prefix below
table = "#__session"
prefix = ""

# Milliseconds to wait on a locked database before a statement fails
busy_timeout_ms = 5000

[session]
# "upsert" creates missing rows on write
# "update_only" only updates rows that already exist
write_policy = "upsert"

# "propagate" makes close() fail when the deferred gc delete fails
# "log" logs the failure and lets close() succeed
deferred_gc_errors = "propagate"

# Default lifetime for `dbsession gc`
max_lifetime_secs = 1440
"##;

        let path = expand_path(path.as_ref());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.table, "#__session");
        assert!(config.database.prefix.is_empty());
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.session.write_policy, WritePolicy::Upsert);
        assert_eq!(
            config.session.deferred_gc_errors,
            DeferredGcErrors::Propagate
        );
        assert_eq!(config.session.max_lifetime_secs, 1440);
    }

    #[test]
    fn test_parse_config() {
        let toml = r##"
[database]
path = "/var/lib/app/sessions.db"
table = "#__session"
prefix = "jos_"

[session]
write_policy = "update_only"
deferred_gc_errors = "log"
"##;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.database.path(),
            PathBuf::from("/var/lib/app/sessions.db")
        );
        assert_eq!(config.database.prefix, "jos_");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.session.write_policy, WritePolicy::UpdateOnly);
        assert_eq!(config.session.deferred_gc_errors, DeferredGcErrors::Log);
        assert_eq!(config.session.max_lifetime_secs, 1440);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let toml = r#"
[session]
write_policy = "insert_only"
"#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_create_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_default(&path).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.database.table, "#__session");
        assert_eq!(config.session.write_policy, WritePolicy::Upsert);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HandlerError::Config(_)));
    }
}
