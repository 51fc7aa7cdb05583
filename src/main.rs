//! dbsession CLI - inspect and maintain a session table through the save handler

use clap::{Parser, Subcommand};
use dbsession::config::expand_path;
use dbsession::{Config, DatabaseHandler, SaveHandler};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dbsession")]
#[command(version)]
#[command(about = "Database-backed session save handler", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.dbsession/config.toml")]
    config: PathBuf,

    /// Override the session database path
    #[arg(long, env = "DBSESSION_DB_PATH")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file
    Init,

    /// Print the stored data for a session
    Read { session_id: String },

    /// Store data for a session
    Write { session_id: String, data: String },

    /// Delete a session
    Destroy { session_id: String },

    /// Remove sessions not written within the lifetime
    Gc {
        /// Lifetime in seconds (defaults to session.max_lifetime_secs)
        #[arg(long)]
        max_lifetime: Option<i64>,
    },

    /// List stored sessions
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dbsession={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = expand_path(&args.config);

    // Handle init before touching the database
    let command = match args.command {
        Command::Init => {
            if config_path.exists() {
                tracing::warn!("Config file already exists: {}", config_path.display());
                return Ok(());
            }
            Config::create_default(&config_path)?;
            tracing::info!("Created default config at: {}", config_path.display());
            return Ok(());
        }
        command => command,
    };

    // Load configuration
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::debug!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
        Config::default()
    };
    config.apply_env_overrides();
    if let Some(db) = args.db {
        config.database.path = db;
    }

    let mut handler = DatabaseHandler::from_config(&config)?;
    handler.open(&config.database.path().to_string_lossy(), "")?;

    match command {
        // init returned before the handler was built
        Command::Init => unreachable!(),
        Command::Read { session_id } => {
            println!("{}", handler.read(&session_id));
        }
        Command::Write { session_id, data } => {
            println!("{}", handler.write(&session_id, &data));
        }
        Command::Destroy { session_id } => {
            println!("{}", handler.destroy(&session_id));
        }
        Command::Gc { max_lifetime } => {
            handler.gc(max_lifetime.unwrap_or(config.session.max_lifetime_secs));
        }
        Command::List { json } => {
            let records = handler.database().list_sessions()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!(
                        "{}\t{}\t{} bytes",
                        record.session_id,
                        chrono::DateTime::from_timestamp(record.time, 0)
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| record.time.to_string()),
                        record.data.len()
                    );
                }
            }
        }
    }

    handler.close()?;
    if let Some(removed) = handler.collected() {
        println!("{} expired sessions removed", removed);
    }

    Ok(())
}
