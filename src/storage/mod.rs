//! Storage Engine Module
//!
//! The core in-memory storage for EmberKV: a thread-safe, sharded mapping
//! from byte-string keys to byte-string values.
//!
//! - **Sharded Storage**: independent shards reduce lock contention
//! - **RwLock**: multiple concurrent readers, exclusive writers
//! - **Flat keyspace**: no expiry, no typed values, no delete
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("ember"));
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("ember")));
//! ```

pub mod engine;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
