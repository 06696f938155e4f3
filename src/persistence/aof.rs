//! Append-Only File (AOF) Persistence
//!
//! Every mutating command is appended to a durable log file as its original
//! RESP array encoding, with no separator beyond the framing itself: a
//! correctly framed record is self-delimiting. Replaying the log from the
//! start against an empty store reproduces the state that existed before
//! shutdown (repeated SETs on one key collapse to the last one, same as
//! normal execution order).
//!
//! The log is prefix-durable: if the process dies mid-append, the file ends
//! in a truncated record. Replay stops at the last well-formed record and
//! discards the trailing fragment instead of failing.
//!
//! The file handle lives behind an async mutex so concurrent appenders
//! cannot interleave partial writes and corrupt the framing.

use crate::protocol::{RespParser, RespValue};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum AofError {
    /// Underlying file I/O failed (open, write, sync)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Only command arrays may be appended to the log
    #[error("log append expects an array value")]
    NotAnArray,
}

/// The append-only command log.
///
/// One instance is shared by every connection for the lifetime of the
/// process, wrapped in an `Arc`.
#[derive(Debug)]
pub struct AofLog {
    /// File handle for appends; the mutex serializes writers
    file: Mutex<File>,
    log_path: PathBuf,
}

impl AofLog {
    /// Opens or creates the log file at `path` in append mode.
    ///
    /// Failure here is fatal at startup: the server must not serve traffic
    /// without a working log.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AofError> {
        let log_path = path.as_ref().to_path_buf();
        debug!("Opening AOF file: {:?}", log_path);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;

        info!("AOF initialized, using file: {:?}", log_path);

        Ok(AofLog {
            file: Mutex::new(file),
            log_path,
        })
    }

    /// Returns the path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Appends a command to the log.
    ///
    /// The command must be an array (the shape every client command has on
    /// the wire). The record is serialized through the protocol codec and
    /// flushed before the lock is released, so a successful return means
    /// the bytes reached the operating system in one contiguous write.
    pub async fn append(&self, command: &RespValue) -> Result<(), AofError> {
        if !matches!(command, RespValue::Array(_)) {
            return Err(AofError::NotAnArray);
        }

        let bytes = command.serialize();

        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.flush().await?;

        Ok(())
    }

    /// Reads the log from the start and returns every well-formed command
    /// array in original order.
    ///
    /// A missing file means a fresh store (empty replay). A malformed or
    /// truncated trailing fragment ends replay at the last good record; it
    /// is logged, not treated as fatal.
    pub async fn replay(&self) -> Result<Vec<RespValue>, AofError> {
        let data = match fs::read(&self.log_path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("AOF file not found, starting fresh");
                return Ok(Vec::new());
            }
            Err(e) => return Err(AofError::Io(e)),
        };

        let mut parser = RespParser::new();
        let mut commands = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match parser.parse(&data[offset..]) {
                Ok(Some((value @ RespValue::Array(_), consumed))) => {
                    commands.push(value);
                    offset += consumed;
                }
                Ok(Some((other, _))) => {
                    warn!(
                        "AOF contains a non-array record at offset {}: {:?}; stopping replay",
                        offset, other
                    );
                    break;
                }
                Ok(None) => {
                    warn!(
                        "AOF ends in a truncated record ({} trailing bytes discarded)",
                        data.len() - offset
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        "AOF record at offset {} is malformed ({}); stopping replay",
                        offset, e
                    );
                    break;
                }
            }
        }

        info!("Replayed {} commands from AOF", commands.len());
        Ok(commands)
    }

    /// Forces buffered appends to stable storage.
    ///
    /// Called on shutdown so that every acknowledged write survives the
    /// process exit.
    pub async fn sync(&self) -> Result<(), AofError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}
