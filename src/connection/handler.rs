//! Connection Handler Module
//!
//! Each client connection is served by its own task, strictly in order:
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read one RESP value     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Dispatch to Extension   │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send encoded reply      │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / protocol error / shutdown
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! Replies are encoded into an in-memory buffer by the dispatcher and then
//! written to the socket in one go, so a handler never awaits the network.

use crate::commands::Extension;
use crate::connection::conn::WriterConn;
use crate::connection::dispatch::{dispatch, DispatchError, Dispatched};
use crate::protocol::{ParseError, ReadError, RespReader, RespWriter};
use crate::shutdown::Shutdown;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests dispatched
    pub commands_processed: AtomicU64,
    /// Requests answered with an error reply
    pub error_replies: AtomicU64,
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

    pub fn command_processed(&self, outcome: Dispatched) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if outcome == Dispatched::ErrorReply {
            self.error_replies.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// Decodes requests from the read half
    reader: RespReader<OwnedReadHalf>,

    /// The write half of the socket
    stream: BufWriter<OwnedWriteHalf>,

    /// Reply encoder; bytes are drained to `stream` after each request
    conn: WriterConn<Vec<u8>>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The command registry (shared across connections)
    extension: Arc<Extension>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    shutdown: Shutdown,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// `max_buffer_size` caps the bytes buffered for one incomplete request.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        extension: Arc<Extension>,
        stats: Arc<ConnectionStats>,
        shutdown: Shutdown,
        max_buffer_size: usize,
    ) -> Self {
        stats.connection_opened();

        let (read_half, write_half) = stream.into_split();

        Self {
            reader: RespReader::with_max_buffer_size(read_half, max_buffer_size),
            stream: BufWriter::new(write_half),
            conn: WriterConn::new(Vec::new()),
            addr,
            extension,
            stats,
            shutdown,
        }
    }

    /// Runs the connection until the client leaves, an error occurs, or
    /// shutdown is signalled.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed by server"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let read = tokio::select! {
                read = self.reader.read_value() => read,
                _ = self.shutdown.recv() => return Ok(()),
            };

            let request = match read {
                Ok(request) => request,
                Err(ReadError::Protocol(e)) => {
                    self.reject_stream(&e).await;
                    return Err(ConnectionError::ParseError(e));
                }
                Err(e) => return Err(e.into()),
            };

            trace!(client = %self.addr, request = %request, "Dispatching");

            let outcome = dispatch(
                &self.extension,
                request,
                &mut self.conn,
                Some(&self.shutdown),
            )?;
            self.stats.command_processed(outcome);

            self.send_pending().await?;
        }
    }

    /// Writes the encoded reply bytes to the socket.
    async fn send_pending(&mut self) -> Result<(), ConnectionError> {
        let bytes = self.conn.take_pending();
        if bytes.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");
        Ok(())
    }

    /// Tells the client why the stream is being dropped. Best effort.
    async fn reject_stream(&mut self, err: &ParseError) {
        debug!(client = %self.addr, "Rejecting malformed stream");

        let mut writer = RespWriter::new(Vec::new());
        let message = format!("ERR Protocol error: {}", err);
        if writer.write_error(&message).is_ok() {
            let bytes = writer.into_inner();
            let _ = self.stream.write_all(&bytes).await;
            let _ = self.stream.flush().await;
        }
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

    /// The reply could not be completed
    #[error("Dispatch error: {0}")]
    DispatchError(#[from] DispatchError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded: {0} bytes")]
    BufferFull(usize),
}

impl From<ReadError> for ConnectionError {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Protocol(e) => ConnectionError::ParseError(e),
            ReadError::Io(e) => ConnectionError::IoError(e),
            ReadError::Closed => ConnectionError::ClientDisconnected,
            ReadError::BufferFull { size } => ConnectionError::BufferFull(size),
        }
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    extension: Arc<Extension>,
    stats: Arc<ConnectionStats>,
    shutdown: Shutdown,
    max_buffer_size: usize,
) {
    let handler = ConnectionHandler::new(stream, addr, extension, stats, shutdown, max_buffer_size);
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
