//! Adapter from [`RespWriter`] to the [`RedisConn`] capability set.

use crate::commands::{RedisConn, ReplyError};
use crate::protocol::RespWriter;
use std::fmt::Display;
use std::io::Write;

/// A [`RedisConn`] backed by a [`RespWriter`].
///
/// String replies go out as bulk strings, so an empty string reply is
/// indistinguishable from a null reply on the wire.
#[derive(Debug)]
pub struct WriterConn<W> {
    writer: RespWriter<W>,
}

impl<W: Write> WriterConn<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: RespWriter::new(sink),
        }
    }

    pub fn writer(&self) -> &RespWriter<W> {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut RespWriter<W> {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl WriterConn<Vec<u8>> {
    /// Takes every byte encoded so far, leaving the buffer empty.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(self.writer.get_mut())
    }
}

impl<W: Write> RedisConn for WriterConn<W> {
    fn write_string(&mut self, s: &str) -> Result<(), ReplyError> {
        Ok(self.writer.write_bulk_string(s)?)
    }

    fn write_int(&mut self, i: i64) -> Result<(), ReplyError> {
        Ok(self.writer.write_integer(i)?)
    }

    fn write_array(&mut self, length: i64) -> Result<(), ReplyError> {
        Ok(self.writer.write_array(length)?)
    }

    fn write_null(&mut self) -> Result<(), ReplyError> {
        Ok(self.writer.write_null()?)
    }

    fn write_error(&mut self, err: &dyn Display) -> Result<(), ReplyError> {
        Ok(self.writer.write_error(err)?)
    }

    fn flush(&mut self) -> Result<(), ReplyError> {
        Ok(self.writer.flush()?)
    }
}
