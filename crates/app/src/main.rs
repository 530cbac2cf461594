//! Roomchat - single-room live chat
//!
//! `roomchat serve` hosts the room log over TCP; `roomchat chat` joins it
//! from a terminal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use roomchat_core::{Database, LocalLog, LogService, RoomId};
use roomchat_net::{Client, Server, DEFAULT_PORT};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chat;
mod config;
mod error;
mod identity;
mod terminal;

use config::AppConfig;
use error::{AppError, Result};

#[derive(Parser, Debug)]
#[command(name = "roomchat", version, about = "Single-room live chat")]
struct Cli {
    /// Config file (defaults to roomchat.toml in the platform config directory)
    #[arg(long, env = "ROOMCHAT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host the room log
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// SQLite file to persist messages in
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Join the room from this terminal
    Chat {
        /// Log server, `host:port`
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        room: Option<String>,
        /// Run against an in-process log instead of a server
        #[arg(long)]
        local: bool,
    },
}

fn main() {
    // Logs go to stderr so they never interleave with the chat on stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port, db } => serve(port, db.or(config.database)).await,
        Command::Chat {
            server,
            room,
            local,
        } => {
            let service: Arc<dyn LogService> = if local {
                tracing::info!("Using in-process log");
                Arc::new(LocalLog::new())
            } else {
                let server = server.unwrap_or_else(|| config.server.clone());
                Arc::new(Client::connect(resolve(&server).await?).await?)
            };

            let deps = chat::ChatDeps {
                room: RoomId::new(room.unwrap_or_else(|| config.room.clone())),
                service,
                provider: Arc::new(identity::ProfileProvider::new(config.accounts)),
                presenter: Arc::new(terminal::TerminalPresenter::new(std::io::stdout())),
            };
            chat::run(BufReader::new(tokio::io::stdin()), deps).await
        }
    }
}

async fn serve(port: u16, db: Option<PathBuf>) -> Result<()> {
    let log = match db {
        Some(path) => {
            tracing::info!(path = %path.display(), "Opening message database");
            LocalLog::with_database(Database::open(&path)?)
        }
        None => LocalLog::new(),
    };

    let server = Server::start(SocketAddr::from(([0, 0, 0, 0], port)), Arc::new(log)).await?;
    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}

async fn resolve(server: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(server)
        .await?
        .next()
        .ok_or_else(|| AppError::Resolve(server.to_string()))
}
