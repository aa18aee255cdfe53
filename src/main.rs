use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use brigade::dispatch::db::DispatchDb;
use brigade::dispatch::server::{DEFAULT_PORT, ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "brigade")]
#[command(about = "Fire-department incident dispatch backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch server (REST + realtime socket)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Path to the SQLite database file
        #[arg(long, default_value = ".brigade/dispatch.db")]
        db_path: PathBuf,

        /// Initialize the database and exit
        #[arg(long)]
        init: bool,

        /// Development mode: loopback bind and permissive CORS
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            db_path,
            init,
            dev,
        } => {
            if init {
                if let Some(parent) = db_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                DispatchDb::new(&db_path)?;
                println!("Initialized database at {}", db_path.display());
                return Ok(());
            }
            start_server(ServerConfig {
                port,
                db_path,
                dev_mode: dev,
            })
            .await
        }
    }
}
