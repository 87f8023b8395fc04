//! `inbox`: command-line client for the messaging backend.
//!
//! # Architecture Overview
//!
//! ```text
//!   inbox <command>
//!        │
//!        ├── register / login / send ──► HttpTransport (pass-through)
//!        │
//!        ├── messages / unread / mark-read ──► ResilienceClient
//!        │                                     retry → breaker → cache
//!        │
//!        └── watch ──► ConnectionManager ──► WsConnector
//!                          │
//!                          └── Ctrl-C ──► Shutdown ──► socket closed
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use inbox_resilience::api::{AuthToken, Credentials, HttpTransport, Session};
use inbox_resilience::client::{DegradedCause, Origin, Resilient, ResilienceClient};
use inbox_resilience::config::{load_config, ClientConfig};
use inbox_resilience::connection::{ConnectionManager, ConnectionStatus, PushEvent, WsConnector};
use inbox_resilience::lifecycle::{spawn_signal_handler, Shutdown};
use inbox_resilience::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "inbox")]
#[command(about = "Resilient client for the messaging backend", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Auth token from `inbox login`
    #[arg(short, long, global = true, env = "INBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register { username: String, password: String },
    /// Log in and print a token
    Login { username: String, password: String },
    /// Send a message to a user
    Send { username: String, content: String },
    /// List a user's messages
    Messages { username: String },
    /// Show a user's unread count
    Unread { username: String },
    /// Mark messages as read
    MarkRead {
        username: String,
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Stream notifications until Ctrl-C
    Watch { username: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::debug!(
        base_url = %config.api.base_url,
        connection_url = %config.connection.url,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = HttpTransport::new(&config.api)?;
    let client = ResilienceClient::new(transport, &config);

    match cli.command {
        Commands::Register { username, password } => {
            let user = client.register(&Credentials::new(username, password)).await?;
            println!("Registered {} (id {})", user.username, user.id);
        }
        Commands::Login { username, password } => {
            let token = client.login(&Credentials::new(username, password)).await?;
            println!("{}", token.as_str());
        }
        Commands::Send { username, content } => {
            let message = client.send_message(&username, &content).await?;
            println!("Sent message {} to {}", message.id, message.receiver_username);
        }
        Commands::Messages { username } => {
            let token = require_token(cli.token)?;
            let messages = client.get_messages(&username, &token).await?;
            report_degraded(&messages);
            for message in &messages.data {
                let marker = if message.is_read { ' ' } else { '*' };
                println!(
                    "{} [{}] {} {}",
                    marker, message.id, message.created_at, message.content
                );
            }
        }
        Commands::Unread { username } => {
            let token = require_token(cli.token)?;
            let count = client.get_unread_count(&username, &token).await?;
            report_degraded(&count);
            println!("{}", count.into_inner().count);
        }
        Commands::MarkRead { username, ids } => {
            let token = require_token(cli.token)?;
            let response = client.mark_messages_as_read(&username, &ids, &token).await?;
            println!("success: {}", response.success);
        }
        Commands::Watch { username } => {
            let token = require_token(cli.token)?;
            watch(Session::new(username, token), &config).await?;
        }
    }

    Ok(())
}

fn require_token(token: Option<String>) -> Result<AuthToken, Box<dyn std::error::Error>> {
    token
        .map(AuthToken::new)
        .ok_or_else(|| "a token is required (--token or INBOX_TOKEN)".into())
}

fn report_degraded<T>(result: &Resilient<T>) {
    let cause = match result.cause() {
        Some(DegradedCause::CircuitOpen) => "service unavailable",
        Some(DegradedCause::RetriesExhausted) => "backend unreachable",
        None => return,
    };
    match result.origin {
        Origin::Cache { fresh, age, .. } => eprintln!(
            "warning: {}; showing {} cached data from {}s ago",
            cause,
            if fresh { "recent" } else { "stale" },
            age.as_secs()
        ),
        Origin::Default { .. } => eprintln!("warning: {}; showing default value", cause),
        Origin::Live => {}
    }
}

async fn watch(session: Session, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connector = WsConnector::new(&config.connection)?;
    let manager = ConnectionManager::start(session, &config.connection, connector);

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    let signals = spawn_signal_handler(shutdown.clone());

    let mut events = manager.subscribe();
    let mut state = manager.watch_state();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Ok(PushEvent::NewMessage(message)) => {
                    println!("new message [{}]: {}", message.id, message.content);
                }
                Ok(PushEvent::UnreadCount(count)) => println!("unread: {}", count.count),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification output fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                match current.status {
                    ConnectionStatus::Connected => eprintln!("connected"),
                    ConnectionStatus::Reconnecting => eprintln!(
                        "connection lost, reconnecting (attempt {})",
                        current.attempt_count + 1
                    ),
                    ConnectionStatus::Exhausted => eprintln!(
                        "{}",
                        current.last_error.as_deref().unwrap_or("notification service unavailable")
                    ),
                    _ => {}
                }
            }
        }
    }

    signals.abort();
    manager.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
