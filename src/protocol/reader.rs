//! Buffered RESP Reader
//!
//! [`RespReader`] pulls bytes from any async source into a `BytesMut`
//! buffer and feeds the incremental [`RespParser`] until one complete value
//! is available. TCP may deliver half a frame or several frames in one read;
//! leftover bytes stay buffered for the next call.

use crate::protocol::parser::{ParseError, RespParser};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Default cap on buffered, not yet decoded bytes (64 MiB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Errors returned by [`RespReader::read_value`].
///
/// All of them end the stream; the reader offers no resynchronisation.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The bytes violate the protocol (including a truncated final value)
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// I/O error from the underlying source
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source reached end of stream between values
    #[error("stream closed")]
    Closed,

    /// More than the configured number of bytes are pending without a complete value
    #[error("read buffer limit exceeded: {size} bytes")]
    BufferFull { size: usize },
}

/// Reads RESP values from an async byte source.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use respext::protocol::{RespReader, RespValue};
///
/// let mut reader = RespReader::new(&b":42\r\n+OK\r\n"[..]);
/// assert_eq!(reader.read_value().await.unwrap(), RespValue::Integer(42));
/// assert_eq!(reader.read_value().await.unwrap(), RespValue::simple_string("OK"));
/// # });
/// ```
#[derive(Debug)]
pub struct RespReader<R> {
    source: R,
    buffer: BytesMut,
    parser: RespParser,
    max_buffer_size: usize,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_max_buffer_size(source, DEFAULT_MAX_BUFFER_SIZE)
    }

    /// Creates a reader that refuses to buffer more than `max_buffer_size` bytes.
    pub fn with_max_buffer_size(source: R, max_buffer_size: usize) -> Self {
        Self {
            source,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            max_buffer_size,
        }
    }

    /// Reads the next complete value.
    ///
    /// Blocks (asynchronously) until enough bytes arrived. End of stream
    /// with an empty buffer is [`ReadError::Closed`]; end of stream inside
    /// a value is [`ParseError::TruncatedInput`].
    pub async fn read_value(&mut self) -> Result<RespValue, ReadError> {
        loop {
            if let Some((value, consumed)) = self.parser.parse(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Decoded value"
                );
                return Ok(value);
            }

            self.fill_buffer().await?;
        }
    }

    /// Number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    async fn fill_buffer(&mut self) -> Result<(), ReadError> {
        if self.buffer.len() >= self.max_buffer_size {
            return Err(ReadError::BufferFull {
                size: self.buffer.len(),
            });
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.source.read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ReadError::Closed);
            }
            return Err(ReadError::Protocol(ParseError::TruncatedInput {
                buffered: self.buffer.len(),
            }));
        }

        trace!(bytes = n, "Read data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_reads_consecutive_values() {
        let mut reader = RespReader::new(&b"+OK\r\n-ERR bad\r\n:7\r\n"[..]);

        assert_eq!(
            reader.read_value().await.unwrap(),
            RespValue::simple_string("OK")
        );
        assert_eq!(
            reader.read_value().await.unwrap(),
            RespValue::error("ERR bad")
        );
        assert_eq!(reader.read_value().await.unwrap(), RespValue::Integer(7));
        assert!(matches!(reader.read_value().await, Err(ReadError::Closed)));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let source = tokio_test::io::Builder::new()
            .read(b"*2\r\n$4\r\nEC")
            .read(b"HO\r\n$5\r\nwor")
            .read(b"ld\r\n")
            .build();
        let mut reader = RespReader::new(source);

        assert_eq!(
            reader.read_value().await.unwrap(),
            RespValue::command(["ECHO", "world"])
        );
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_null_values_stop_at_header() {
        let mut reader = RespReader::new(&b"$-1\r\n*-1\r\n"[..]);

        assert_eq!(reader.read_value().await.unwrap(), RespValue::Null);
        assert_eq!(reader.buffered(), 5);
        assert_eq!(reader.read_value().await.unwrap(), RespValue::NullArray);
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_truncated_bulk_string() {
        let mut reader = RespReader::new(&b"$10\r\nshort\r\n"[..]);

        let err = reader.read_value().await.unwrap_err();
        assert!(matches!(
            err,
            ReadError::Protocol(ParseError::TruncatedInput { buffered: 12 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_array_yields_no_partial_value() {
        let mut reader = RespReader::new(&b"*3\r\n:1\r\n:2\r\n"[..]);

        assert!(matches!(
            reader.read_value().await,
            Err(ReadError::Protocol(ParseError::TruncatedInput { .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_reported() {
        let mut reader = RespReader::new(&b"?hello\r\n"[..]);

        assert!(matches!(
            reader.read_value().await,
            Err(ReadError::Protocol(ParseError::UnknownType(b'?')))
        ));
    }

    #[tokio::test]
    async fn test_io_error_propagates() {
        let source = tokio_test::io::Builder::new()
            .read(b"$5\r\n")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut reader = RespReader::new(source);

        match reader.read_value().await {
            Err(ReadError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let mut reader = RespReader::with_max_buffer_size(&b"$100\r\nabcdefgh"[..], 8);

        assert!(matches!(
            reader.read_value().await,
            Err(ReadError::BufferFull { .. })
        ));
    }

    #[tokio::test]
    async fn test_binary_payload() {
        let mut reader = RespReader::new(&b"$3\r\n\x00\xff\r\r\n"[..]);

        assert_eq!(
            reader.read_value().await.unwrap(),
            RespValue::BulkString(Bytes::from(&b"\x00\xff\r"[..]))
        );
    }
}
