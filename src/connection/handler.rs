//! Connection Handler Module
//!
//! Each accepted client gets its own handler task that runs a loop: read
//! bytes from the socket, parse one RESP command, execute it, write the
//! encoded response back. The loop ends on clean client disconnect, on any
//! I/O or protocol error, or when the server-wide shutdown signal fires.
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol: a single read may deliver a partial command or
//! several pipelined commands. Incoming data accumulates in a `BytesMut`
//! buffer; the parser consumes complete frames from the front and leaves
//! partial ones for the next read. Responses are written in the order the
//! commands arrived, so per-connection ordering is preserved.
//!
//! ## Shutdown
//!
//! A blocked socket read would otherwise be unrecoverable, so every handler
//! holds a `watch` receiver for the server shutdown signal and races it
//! against the read. On shutdown the handler finishes the commands already
//! buffered and closes the connection.

use crate::commands::CommandHandler;
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: the largest legal bulk payload plus
/// headroom for the surrounding frame. Any command within protocol limits
/// must be able to accumulate here; oversized bulk declarations are caught
/// earlier by the parser.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Manages the read buffer, parsing, dispatch, and response writing for one
/// connected client. The store and log are reached through the shared
/// [`CommandHandler`].
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// RESP parser
    parser: RespParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Server-wide shutdown signal
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
            shutdown,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands from the client, executes them, and sends back
    /// responses until the client disconnects, an error occurs, or the
    /// server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        let mut shutdown = self.shutdown.clone();

        loop {
            // Drain every complete command already in the buffer. This is
            // where pipelined commands get answered in arrival order.
            while let Some(command) = self.try_parse_command()? {
                let response = self.command_handler.execute(command).await;
                self.stats.command_processed();
                self.send_response(&response).await?;
            }

            // Need more data: race the read against the shutdown signal so
            // an idle connection does not outlive the server.
            tokio::select! {
                result = self.read_more_data() => result?,
                changed = shutdown.changed() => {
                    // A dropped sender means the server is gone; same as a
                    // shutdown signal
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(client = %self.addr, "Server shutting down, closing connection");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Attempts to parse a command from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                // Incomplete frame, wait for more data
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                // A framing error poisons the stream; only this connection dies
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial command in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// RESP parse error
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection to completion.
///
/// Convenience wrapper that creates a [`ConnectionHandler`] and runs it,
/// downgrading expected disconnects to debug logs.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: watch::Receiver<bool>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AofLog;
    use crate::storage::StorageEngine;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    static TEST_ID: AtomicU32 = AtomicU32::new(0);

    fn temp_log_path() -> PathBuf {
        let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "emberkv-connection-test-{}-{}.aof",
            std::process::id(),
            id
        ))
    }

    struct TestServer {
        addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        // Option so tests can drop the sender while the server is running
        shutdown_tx: Option<watch::Sender<bool>>,
        log_path: PathBuf,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.log_path);
        }
    }

    async fn create_test_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log_path = temp_log_path();

        let storage = Arc::new(StorageEngine::new());
        let aof = Arc::new(AofLog::open(&log_path).await.unwrap());
        let handler = CommandHandler::new(storage, aof);
        let stats = Arc::new(ConnectionStats::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = handler.clone();
                let stats = Arc::clone(&stats_clone);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    shutdown,
                ));
            }
        });

        TestServer {
            addr,
            stats,
            shutdown_tx: Some(shutdown_tx),
            log_path,
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nember\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$5\r\nember\r\n");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_null() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$-1\r\n");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // Several commands in one write; responses must come back in order
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n*2\r\n$3\r\nGET\r\n$2\r\nk2\r\n")
            .await
            .unwrap();

        // Expected: +OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n (26 bytes)
        let mut buf = vec![0u8; 256];
        let mut total = 0;
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(2);

        while total < 26 && tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(
                tokio::time::Duration::from_millis(100),
                client.read(&mut buf[total..]),
            )
            .await
            {
                Ok(Ok(n)) if n > 0 => total += n,
                _ => break,
            }
        }

        assert_eq!(&buf[..total], b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n");
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_only_that_connection() {
        let server = create_test_server().await;

        let mut bad_client = TcpStream::connect(server.addr).await.unwrap();
        bad_client.write_all(b"@nonsense\r\n").await.unwrap();

        // The offending connection gets closed
        let mut buf = [0u8; 64];
        let n = bad_client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // A fresh connection still works
        let mut good_client = TcpStream::connect(server.addr).await.unwrap();
        good_client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let n = good_client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_shutdown_signal_closes_idle_connection() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // Make sure the connection is up
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");

        // Signal shutdown; the idle connection should be closed by the server
        server.shutdown_tx.as_ref().unwrap().send(true).unwrap();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_closes_idle_connection() {
        let mut server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");

        // Dropping the sender counts as shutdown, not a reason to spin
        server.shutdown_tx.take();
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_large_value_roundtrip() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // A 100 KB payload, well past any single read but within protocol limits
        let payload = vec![b'x'; 100 * 1024];
        let mut frame = Vec::new();
        frame.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$3\r\nbig\r\n");
        frame.extend_from_slice(format!("${}\r\n", payload.len()).as_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(b"\r\n");

        client.write_all(&frame).await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nbig\r\n")
            .await
            .unwrap();

        // $102400\r\n + payload + \r\n
        let expected_len = format!("${}\r\n", payload.len()).len() + payload.len() + 2;
        let mut response = vec![0u8; expected_len];
        let mut total = 0;
        while total < expected_len {
            let n = client.read(&mut response[total..]).await.unwrap();
            assert!(n > 0, "connection closed before full response");
            total += n;
        }

        assert!(response.starts_with(b"$102400\r\n"));
        assert!(response.ends_with(b"\r\n"));
        assert_eq!(&response[9..9 + payload.len()], &payload[..]);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server().await;

        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(server.addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(
            server.stats.connections_accepted.load(Ordering::Relaxed),
            1
        );
        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(server.stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(server.stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(server.stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
