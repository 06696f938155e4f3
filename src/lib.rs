//! # EmberKV - A Persistent In-Memory Key-Value Server
//!
//! EmberKV is a RESP-speaking, in-memory key-value server written in Rust.
//! Every write is recorded in an append-only log, so a restarted server
//! rebuilds its state by replaying the log before accepting connections.
//!
//! ## Features
//!
//! - **RESP Protocol**: Binary-safe wire format compatible with standard clients
//! - **Concurrent Storage**: Sharded hash map with per-shard RwLocks
//! - **Durability**: Append-only persistence log with crash-tolerant replay
//! - **Async I/O**: Built on Tokio, one lightweight task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                 │
//! │                                                                      │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐               │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │               │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │               │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘               │
//! │                                               │                      │
//! │                            ┌──────────────────┼─────────────────┐    │
//! │                            ▼                  ▼                 │    │
//! │  ┌─────────────┐    ┌──────────────────────────────┐   ┌────────┴──┐ │
//! │  │   RESP      │    │        StorageEngine         │   │  AofLog   │ │
//! │  │   Parser    │    │  ┌──────┐ ┌──────┐ ┌──────┐  │   │ (append-  │ │
//! │  │             │    │  │Shard0│ │Shard1│ │ ...N │  │   │ only file)│ │
//! │  └─────────────┘    │  │RwLock│ │RwLock│ │shards│  │   └───────────┘ │
//! │                     │  └──────┘ └──────┘ └──────┘  │                 │
//! │                     └──────────────────────────────┘                 │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberkv::commands::CommandHandler;
//! use emberkv::connection::{handle_connection, ConnectionStats};
//! use emberkv::persistence::AofLog;
//! use emberkv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let aof = Arc::new(AofLog::open("emberkv.aof").await.unwrap());
//!     let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&aof));
//!
//!     // Rebuild state from the log before serving traffic
//!     for record in aof.replay().await.unwrap() {
//!         handler.apply(record).await;
//!     }
//!
//!     let stats = Arc::new(ConnectionStats::new());
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         let handler = handler.clone();
//!         let stats = Arc::clone(&stats);
//!         let shutdown = shutdown_rx.clone();
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats, shutdown));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value`
//! - `GET key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP protocol parser and types
//! - [`storage`]: Thread-safe sharded storage engine
//! - [`persistence`]: Append-only log with replay
//! - [`commands`]: Command dispatch and handlers
//! - [`connection`]: Client connection management
//!
//! ## Design Highlights
//!
//! ### Thread Safety
//!
//! The storage engine uses a sharded design with independent RwLocks, so
//! operations on different keys rarely contend for the same lock.
//!
//! ### Durability Model
//!
//! Writes are applied to memory first and then appended to the log. On
//! restart the log is replayed up to the last complete record; a torn
//! trailing record from a crash mid-append is discarded.
//!
//! ### Binary Safety
//!
//! Keys and values travel as length-prefixed bulk strings and are stored as
//! `bytes::Bytes`, so any byte sequence works, including CR, LF, and NUL.

pub mod commands;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{AofError, AofLog};
pub use protocol::{ParseError, RespParser, RespValue};
pub use storage::StorageEngine;

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default append-only log path
pub const DEFAULT_AOF_PATH: &str = "emberkv.aof";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
