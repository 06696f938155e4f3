//! Command Handler Module
//!
//! Interprets a decoded RESP command, validates its shape and arity, runs it
//! against the storage engine, and drives AOF appends for mutations.
//!
//! ## Supported Commands
//!
//! - `PING [message]` - test the connection
//! - `ECHO message` - echo a bulk string back
//! - `SET key value` - store a key (appended to the AOF)
//! - `GET key` - fetch a key, null bulk string when absent
//!
//! Dispatch never fails as a Rust error: every invalid command comes back
//! as a RESP `Error` value for the client, and the connection continues.
//!
//! ## Durability policy
//!
//! SET mutates the in-memory store first and then appends to the AOF. If
//! the append fails, the failure is reported to the operator and the client
//! still receives `+OK`: the value is visible but not guaranteed to survive
//! a crash.

use crate::persistence::AofLog;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::error;

/// Executes commands against the shared store and log.
///
/// Cheap to clone; each connection gets its own copy holding `Arc`s to the
/// process-wide singletons.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// The append-only log for mutating commands
    aof: Arc<AofLog>,
}

impl CommandHandler {
    /// Creates a new command handler over the given store and log.
    pub fn new(storage: Arc<StorageEngine>, aof: Arc<AofLog>) -> Self {
        Self { storage, aof }
    }

    /// Executes a live command and returns the response.
    ///
    /// Mutations are appended to the AOF.
    pub async fn execute(&self, command: RespValue) -> RespValue {
        self.run(command, true).await
    }

    /// Executes a command replayed from the AOF.
    ///
    /// Identical to [`execute`](Self::execute) except that the command is
    /// not re-appended to the log, which would duplicate it.
    pub async fn apply(&self, command: RespValue) -> RespValue {
        self.run(command, false).await
    }

    async fn run(&self, command: RespValue, persist: bool) -> RespValue {
        let args = match command.as_array() {
            Some(args) => args,
            None => return RespValue::error("ERR Command must be an array"),
        };

        if args.is_empty() {
            return RespValue::error("ERR Empty command array");
        }

        // The verb is the first array element and must be a bulk string
        let verb = match &args[0] {
            RespValue::BulkString(b) => String::from_utf8_lossy(b).into_owned(),
            _ => return RespValue::error("ERR Command must be a Bulk String"),
        };

        match verb.to_uppercase().as_str() {
            "PING" => self.cmd_ping(&args[1..]),
            "ECHO" => self.cmd_echo(&args[1..]),
            "SET" => self.cmd_set(&args[1..], &command, persist).await,
            "GET" => self.cmd_get(&args[1..]),
            _ => RespValue::error(format!("ERR unknown command '{}'", verb)),
        }
    }

    /// Extracts the payload of a bulk string argument.
    fn bulk_arg(value: &RespValue) -> Option<Bytes> {
        match value {
            RespValue::BulkString(b) => Some(b.clone()),
            _ => None,
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        match args {
            [] => RespValue::pong(),
            [arg] => match Self::bulk_arg(arg) {
                Some(msg) => RespValue::bulk_string(msg),
                None => RespValue::error("ERR wrong number of arguments for 'ping' command"),
            },
            _ => RespValue::error("ERR wrong number of arguments for 'ping' command"),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        match args {
            [arg] => match Self::bulk_arg(arg) {
                Some(msg) => RespValue::bulk_string(msg),
                None => RespValue::error("ERR wrong number of arguments for 'echo' command"),
            },
            _ => RespValue::error("ERR wrong number of arguments for 'echo' command"),
        }
    }

    /// SET key value
    ///
    /// `command` is the original array, appended verbatim to the AOF so the
    /// log replays through this same dispatch path.
    async fn cmd_set(&self, args: &[RespValue], command: &RespValue, persist: bool) -> RespValue {
        let (key, value) = match args {
            [k, v] => match (Self::bulk_arg(k), Self::bulk_arg(v)) {
                (Some(key), Some(value)) => (key, value),
                _ => return RespValue::error("ERR wrong number of arguments for 'set' command"),
            },
            _ => return RespValue::error("ERR wrong number of arguments for 'set' command"),
        };

        self.storage.set(key, value);

        if persist {
            // Append failure is an operator problem, not a client error: the
            // in-memory write already happened and is not rolled back.
            if let Err(e) = self.aof.append(command).await {
                error!("Failed to append SET to AOF: {}", e);
            }
        }

        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        let key = match args {
            [k] => match Self::bulk_arg(k) {
                Some(key) => key,
                None => return RespValue::error("ERR wrong number of arguments for 'get' command"),
            },
            _ => return RespValue::error("ERR wrong number of arguments for 'get' command"),
        };

        match self.storage.get(&key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }
}
