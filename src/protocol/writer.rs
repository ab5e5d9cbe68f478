//! RESP Writer
//!
//! [`RespWriter`] encodes one complete frame per call and flushes the sink
//! before returning, so a frame never sits half-written in a buffer between
//! two calls. The writer is not synchronised; callers serialise access to
//! one instance through `&mut self`.
//!
//! Two conventions differ from the exact encoder
//! ([`RespValue::serialize`]):
//!
//! - [`write_bulk_string`](RespWriter::write_bulk_string) maps an empty
//!   payload to the null bulk string `$-1\r\n`. An empty-but-present bulk
//!   string cannot be produced through this writer.
//! - [`write_array`](RespWriter::write_array) writes only the header. The
//!   caller must follow it with exactly `length` values; the writer does not
//!   count them.

use crate::protocol::types::{prefix, RespValue, CRLF};
use std::fmt::Display;
use std::io::{self, Write};

/// Encodes RESP frames onto a [`Write`] sink.
///
/// # Example
///
/// ```
/// use respext::protocol::RespWriter;
///
/// let mut writer = RespWriter::new(Vec::new());
/// writer.write_array(2).unwrap();
/// writer.write_bulk_string("hello").unwrap();
/// writer.write_integer(7).unwrap();
/// assert_eq!(writer.get_ref().as_slice(), b"*2\r\n$5\r\nhello\r\n:7\r\n");
/// ```
#[derive(Debug)]
pub struct RespWriter<W> {
    sink: W,
    /// Scratch buffer reused across frames
    frame: Vec<u8>,
}

impl<W: Write> RespWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frame: Vec::with_capacity(64),
        }
    }

    /// Writes `+<text>\r\n`.
    pub fn write_simple_string(&mut self, text: &str) -> io::Result<()> {
        self.start(prefix::SIMPLE_STRING);
        self.frame.extend_from_slice(text.as_bytes());
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes `-<message>\r\n`.
    ///
    /// The message must not contain CR or LF; it is written as is.
    pub fn write_error(&mut self, err: &dyn Display) -> io::Result<()> {
        self.start(prefix::ERROR);
        // Writing into a Vec cannot fail
        let _ = write!(self.frame, "{}", err);
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes `:<decimal>\r\n`.
    pub fn write_integer(&mut self, n: i64) -> io::Result<()> {
        self.start(prefix::INTEGER);
        self.frame.extend_from_slice(n.to_string().as_bytes());
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes `$<len>\r\n<text>\r\n`, or `$-1\r\n` when `text` is empty.
    pub fn write_bulk_string(&mut self, text: impl AsRef<[u8]>) -> io::Result<()> {
        let data = text.as_ref();
        if data.is_empty() {
            return self.write_null();
        }

        self.start(prefix::BULK_STRING);
        self.frame.extend_from_slice(data.len().to_string().as_bytes());
        self.frame.extend_from_slice(CRLF);
        self.frame.extend_from_slice(data);
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes the array header `*<length>\r\n`, or `*-1\r\n` when `length` is negative.
    pub fn write_array(&mut self, length: i64) -> io::Result<()> {
        if length < 0 {
            return self.write_null_array();
        }

        self.start(prefix::ARRAY);
        self.frame.extend_from_slice(length.to_string().as_bytes());
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes the null bulk string `$-1\r\n`.
    pub fn write_null(&mut self) -> io::Result<()> {
        self.start(prefix::BULK_STRING);
        self.frame.extend_from_slice(b"-1");
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes the null array `*-1\r\n`.
    pub fn write_null_array(&mut self) -> io::Result<()> {
        self.start(prefix::ARRAY);
        self.frame.extend_from_slice(b"-1");
        self.frame.extend_from_slice(CRLF);
        self.emit()
    }

    /// Writes a whole value tree through the single-frame operations.
    ///
    /// Bulk strings follow the writer's convention, so an empty one comes
    /// out as `$-1\r\n`.
    pub fn write_value(&mut self, value: &RespValue) -> io::Result<()> {
        match value {
            RespValue::SimpleString(s) => self.write_simple_string(s),
            RespValue::Error(msg) => self.write_error(msg),
            RespValue::Integer(n) => self.write_integer(*n),
            RespValue::BulkString(data) => self.write_bulk_string(data),
            RespValue::Null => self.write_null(),
            RespValue::Array(values) => {
                self.write_array(values.len() as i64)?;
                for v in values {
                    self.write_value(v)?;
                }
                Ok(())
            }
            RespValue::NullArray => self.write_null_array(),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn start(&mut self, type_byte: u8) {
        self.frame.clear();
        self.frame.push(type_byte);
    }

    fn emit(&mut self) -> io::Result<()> {
        self.sink.write_all(&self.frame)?;
        self.sink.flush()
    }
}
