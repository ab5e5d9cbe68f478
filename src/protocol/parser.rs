//! Incremental RESP Parser
//!
//! The parser works on a byte slice and returns one of:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the value is incomplete, more bytes are needed
//! - `Err(ParseError)` - the bytes violate the protocol
//!
//! It never looks past a declared length, so a caller can append incoming
//! network data to a buffer, retry on `Ok(None)`, and advance the buffer by
//! `consumed` once a value is complete. [`RespReader`](super::RespReader)
//! does exactly that on top of an async byte source.
//!
//! A value that is still incomplete when the stream ends is reported as
//! [`ParseError::TruncatedInput`] by the caller that knows the stream ended.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
///
/// Every variant is fatal to the stream: after a malformed value the
/// position of the next frame cannot be trusted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Leading type byte is not one of `+ - : $ *`
    #[error("unknown RESP type byte: {0:#04x}")]
    UnknownType(u8),

    /// An integer line (value or length) is not a base-10 i64
    #[error("malformed integer: {0}")]
    MalformedInteger(String),

    /// A line or payload is not terminated by CRLF
    #[error("malformed framing: {0}")]
    MalformedFraming(String),

    /// The stream ended in the middle of a value
    #[error("truncated input: stream ended with {buffered} bytes of an incomplete value")]
    TruncatedInput { buffered: usize },

    /// Invalid UTF-8 in a simple string, error message or integer line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Arrays nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// The declared bulk length exceeds [`MAX_BULK_SIZE`]
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP parser.
///
/// # Example
///
/// ```
/// use respext::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser
///     .parse(b"*1\r\n$4\r\nPING\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(value, RespValue::command(["PING"]));
/// assert_eq!(consumed, 14);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => self.parse_simple_string(buf),
            prefix::ERROR => self.parse_error(buf),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownType(other)),
        }
    }

    /// Parses a simple string: `+<string>\r\n`
    fn parse_simple_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(read_text_line(buf)?.map(|(s, consumed)| (RespValue::SimpleString(s), consumed)))
    }

    /// Parses an error: `-<error message>\r\n`
    fn parse_error(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(read_text_line(buf)?.map(|(s, consumed)| (RespValue::Error(s), consumed)))
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(read_integer_line(buf)?.map(|(n, consumed)| (RespValue::Integer(n), consumed)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (length, header_len) = match read_integer_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };

        // $-1\r\n: nothing else belongs to this value
        if length == -1 {
            return Ok(Some((RespValue::Null, header_len)));
        }

        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;

        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header_len + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::MalformedFraming(
                "bulk string payload not followed by CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);

        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    ///
    /// A failing element fails the whole array; no partial array escapes.
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, header_len) = match read_integer_line(buf)? {
            Some(line) => line,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::NullArray, header_len)));
        }

        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;

        // Cap the preallocation; the count is attacker controlled
        let mut elements = Vec::with_capacity(count.min(1024));
        let mut consumed = header_len;

        self.depth += 1;

        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }

        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Locates the line that starts after the type byte.
///
/// Returns the index of the terminating `\r` relative to `buf`, or `None` if
/// no `\n` has arrived yet. A `\n` that is not preceded by `\r` is a framing
/// error.
fn find_line_end(buf: &[u8]) -> ParseResult<Option<usize>> {
    let newline = match buf.iter().skip(1).position(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => return Ok(None),
    };

    if newline < 2 || buf[newline - 1] != b'\r' {
        return Err(ParseError::MalformedFraming(
            "line not terminated by CRLF".to_string(),
        ));
    }

    Ok(Some(newline - 1))
}

/// Reads `<type byte><text>\r\n`, returning the text and the bytes consumed.
fn read_text_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    let end = match find_line_end(buf)? {
        Some(end) => end,
        None => return Ok(None),
    };

    let s = std::str::from_utf8(&buf[1..end]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    Ok(Some((s.to_string(), end + 2)))
}

/// Reads `<type byte><decimal>\r\n`, returning the integer and the bytes consumed.
fn read_integer_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let (line, consumed) = match read_text_line(buf)? {
        Some(line) => line,
        None => return Ok(None),
    };

    let n: i64 = line
        .parse()
        .map_err(|e: ParseIntError| ParseError::MalformedInteger(format!("{:?}: {}", line, e)))?;

    Ok(Some((n, consumed)))
}

/// Parses a single RESP message from bytes that may still be growing.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

/// Decodes one value from a buffer that is known to be complete.
///
/// An incomplete value is reported as [`ParseError::TruncatedInput`].
pub fn decode(buf: &[u8]) -> ParseResult<(RespValue, usize)> {
    parse_message(buf)?.ok_or(ParseError::TruncatedInput {
        buffered: buf.len(),
    })
}
