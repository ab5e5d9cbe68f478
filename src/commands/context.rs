//! Execution Context and the connection capability set
//!
//! A [`Context`] lives for exactly one request. It owns the parsed
//! arguments and borrows the connection through the [`RedisConn`] trait, so
//! handlers never see the concrete transport. Every reply helper is a
//! one-to-one forward; the Context adds no buffering or validation.

use crate::shutdown::Shutdown;
use std::fmt::Display;

/// Errors surfaced by [`RedisConn`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// The transport failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A complete reply was already sent for this request
    #[error("reply already sent for this request")]
    AlreadyReplied,
}

/// The reply capability set a transport provides.
///
/// Any sink that can emit these six operations can drive a [`Context`]:
/// a TCP writer, a pipe, or an in-memory test double.
pub trait RedisConn {
    /// Writes a string reply.
    fn write_string(&mut self, s: &str) -> Result<(), ReplyError>;

    fn write_int(&mut self, i: i64) -> Result<(), ReplyError>;

    /// Writes an array header; the caller then writes `length` elements.
    /// A negative length writes the null array.
    fn write_array(&mut self, length: i64) -> Result<(), ReplyError>;

    fn write_null(&mut self) -> Result<(), ReplyError>;

    /// Writes an error reply. The message must not contain CR or LF.
    fn write_error(&mut self, err: &dyn Display) -> Result<(), ReplyError>;

    fn flush(&mut self) -> Result<(), ReplyError>;
}

/// Per-request execution context handed to command handlers.
pub struct Context<'a> {
    args: Vec<String>,
    conn: &'a mut dyn RedisConn,
    shutdown: Option<Shutdown>,
}

impl<'a> Context<'a> {
    /// Creates a context; `args[0]` is the command name.
    pub fn new(args: Vec<String>, conn: &'a mut dyn RedisConn) -> Self {
        Self {
            args,
            conn,
            shutdown: None,
        }
    }

    /// Attaches the connection's cancellation scope.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// All arguments, command name included.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// The command name as sent by the client.
    pub fn name(&self) -> &str {
        self.arg(0).unwrap_or_default()
    }

    /// Returns true if the server is shutting down.
    ///
    /// Long-running handlers may poll this and bail out early.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map_or(false, Shutdown::is_shutdown)
    }

    pub fn reply(&mut self, s: &str) -> Result<(), ReplyError> {
        self.conn.write_string(s)
    }

    pub fn reply_int(&mut self, i: i64) -> Result<(), ReplyError> {
        self.conn.write_int(i)
    }

    /// Starts an array reply; follow it with exactly `length` replies.
    pub fn reply_array(&mut self, length: i64) -> Result<(), ReplyError> {
        self.conn.write_array(length)
    }

    pub fn reply_null(&mut self) -> Result<(), ReplyError> {
        self.conn.write_null()
    }

    pub fn reply_error(&mut self, err: &dyn Display) -> Result<(), ReplyError> {
        self.conn.write_error(err)
    }

    pub fn flush(&mut self) -> Result<(), ReplyError> {
        self.conn.flush()
    }
}
