//! Command Handler Module
//!
//! The command processing layer for EmberKV. It receives parsed RESP
//! commands, executes them against the storage engine, drives the AOF for
//! mutations, and returns RESP responses.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Validate     │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ├──────────────────┐
//!          ▼                  ▼
//! ┌─────────────────┐  ┌─────────────┐
//! │ StorageEngine   │  │   AofLog    │  (mutations only)
//! └─────────────────┘  └─────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value`
//! - `GET key`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
