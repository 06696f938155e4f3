//! Thread-Safe Storage Engine
//!
//! The authoritative in-memory mapping from key to value. The store is a
//! flat byte-string keyspace: keys and values are arbitrary binary data,
//! keys are unique, last write wins.
//!
//! ## Concurrency Model
//!
//! The keyspace is split across a fixed number of shards, each guarded by
//! its own `RwLock`. A write takes the exclusive lock on one shard only, so
//! reads stay concurrent with other reads and with writes to disjoint keys,
//! while conflicting operations on the same key serialize on the shard lock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 16;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug)]
struct Shard {
    data: RwLock<HashMap<Bytes, Bytes>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

/// The in-memory key-value store shared by every connection.
///
/// Created empty at startup, repopulated by log replay, and then mutated by
/// live traffic for the lifetime of the process.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("ember"));
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("ember")));
/// assert_eq!(engine.get(&Bytes::from("missing")), None);
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Statistics: total number of keys (approximate)
    key_count: AtomicU64,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Sets a key-value pair. Unconditional upsert: if the key already
    /// exists, its value is overwritten.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key
    /// was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(&key);
        let mut data = shard.data.write().unwrap();

        let is_new = data.insert(key, value).is_none();

        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist. Absence is a normal result,
    /// not an error.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);
        let data = shard.data.read().unwrap();
        data.get(key).cloned()
    }

    /// Returns the approximate number of keys in the store.
    ///
    /// This is an approximation because it uses relaxed atomic ordering.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine.set(Bytes::from("key"), Bytes::from("value"));
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(&Bytes::from("nonexistent")), None);
    }

    #[test]
    fn test_last_write_wins() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("first")));
        assert!(!engine.set(Bytes::from("key"), Bytes::from("second")));
        assert_eq!(engine.get(&Bytes::from("key")), Some(Bytes::from("second")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_binary_keys_and_values() {
        let engine = StorageEngine::new();

        let key = Bytes::from(&b"k\x00ey"[..]);
        let value = Bytes::from(&b"v\r\nal\x00ue"[..]);
        engine.set(key.clone(), value.clone());
        assert_eq!(engine.get(&key), Some(value));
    }

    #[test]
    fn test_len() {
        let engine = StorageEngine::new();

        assert!(engine.is_empty());
        engine.set(Bytes::from("a"), Bytes::from("1"));
        engine.set(Bytes::from("b"), Bytes::from("2"));
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set(Bytes::from("a"), Bytes::from("1"));
        engine.get(&Bytes::from("a"));
        engine.get(&Bytes::from("b"));

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 2);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        // Spawn multiple writers on disjoint keys
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    engine.set(Bytes::from(key.clone()), Bytes::from("value"));
                    assert_eq!(engine.get(&Bytes::from(key)), Some(Bytes::from("value")));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
    }
}
