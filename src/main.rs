//! EmberKV - A Persistent In-Memory Key-Value Server
//!
//! This is the main entry point for the EmberKV server.
//! It replays the append-only log, binds the TCP listener, and hands each
//! incoming connection to its own handler task.

use emberkv::commands::CommandHandler;
use emberkv::connection::{handle_connection, ConnectionStats};
use emberkv::persistence::AofLog;
use emberkv::storage::StorageEngine;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// How long to wait for active connections to drain on shutdown
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Path to the append-only log file
    aof_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
            aof_path: emberkv::DEFAULT_AOF_PATH.to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--aof" | "-a" => {
                    if i + 1 < args.len() {
                        config.aof_path = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --aof requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("EmberKV version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
EmberKV - A Persistent In-Memory Key-Value Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 6379)
    -a, --aof <PATH>     Append-only log file (default: emberkv.aof)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    emberkv                          # Start on 127.0.0.1:6379
    emberkv --port 6380              # Start on port 6380
    emberkv --aof /var/lib/kv.aof    # Use a custom log location

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6379
    127.0.0.1:6379> PING
    PONG
    127.0.0.1:6379> SET name "ember"
    OK
    127.0.0.1:6379> GET name
    "ember"
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("EmberKV v{} starting", emberkv::VERSION);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    // Open the append-only log and rebuild state before serving traffic
    let aof = Arc::new(AofLog::open(&config.aof_path).await?);
    let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&aof));

    let records = aof.replay().await?;
    let replayed = records.len();
    for record in records {
        handler.apply(record).await;
    }
    info!(
        records = replayed,
        keys = storage.len(),
        path = %config.aof_path,
        "Append-only log replayed"
    );

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Shutdown signal, observed by every connection task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats), shutdown_rx) => {}
        _ = shutdown => {}
    }

    // Tell connection tasks to finish up, then wait for them to drain
    let _ = shutdown_tx.send(true);
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
    loop {
        let active = stats.active_connections.load(Ordering::Relaxed);
        if active == 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(active = active, "Drain timeout reached, closing anyway");
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Make sure everything appended so far is on disk
    if let Err(e) = aof.sync().await {
        error!(error = %e, "Failed to sync append-only log");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);
                let shutdown = shutdown_rx.clone();

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats, shutdown).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
