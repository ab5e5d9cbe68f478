//! RESP Protocol Implementation
//!
//! This module provides the codec for the Redis Serialization Protocol (RESP).
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its exact serializer
//! - `parser`: incremental parser over byte slices
//! - `reader`: async reader that buffers a byte stream and yields values
//! - `writer`: frame-at-a-time writer with flush-per-frame semantics
//!
//! ## Example
//!
//! ```
//! use respext::protocol::{decode, RespValue, RespWriter};
//!
//! // Decoding a request
//! let (value, consumed) = decode(b"*2\r\n$4\r\nECHO\r\n$5\r\nworld\r\n").unwrap();
//! assert_eq!(value, RespValue::command(["ECHO", "world"]));
//! assert_eq!(consumed, 25);
//!
//! // Encoding a reply
//! let mut writer = RespWriter::new(Vec::new());
//! writer.write_bulk_string("world").unwrap();
//! assert_eq!(writer.into_inner(), b"$5\r\nworld\r\n");
//! ```

pub mod parser;
pub mod reader;
pub mod types;
pub mod writer;

pub use parser::{decode, parse_message, ParseError, ParseResult, RespParser};
pub use reader::{ReadError, RespReader};
pub use types::RespValue;
pub use writer::RespWriter;
