//! Persistence Module
//!
//! Durability for EmberKV: an append-only file of RESP-encoded mutating
//! commands. The log is written on every SET and replayed at startup to
//! rebuild the in-memory store, before the server accepts any client
//! traffic. There is no compaction; the log grows with every mutation.

pub mod aof;

// Re-export commonly used types
pub use aof::{AofError, AofLog};
