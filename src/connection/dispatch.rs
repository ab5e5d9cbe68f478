//! Request Dispatch
//!
//! Turns one decoded request into exactly one reply frame:
//!
//! ```text
//! RespValue ──> args ──> Extension::lookup ──> arity check ──> Command::call
//!                │              │                   │               │
//!                └──────────────┴───────────────────┴──> -ERR ...   └──> reply
//! ```
//!
//! Request-level failures (bad shape, unknown command, wrong arity, handler
//! errors) become `-ERR` replies and the connection stays usable. Only
//! transport failures and half-written replies are returned as
//! [`DispatchError`], because after those the stream cannot be trusted.
//!
//! ## Reply discipline
//!
//! The handler's connection is wrapped in a [`ReplyGuard`] that tracks frame
//! boundaries, array elements included:
//!
//! | Handler outcome                      | Dispatcher action                   |
//! |--------------------------------------|-------------------------------------|
//! | `Ok`, one complete reply             | nothing                             |
//! | `Ok`, no reply                       | writes a null bulk string           |
//! | `Err`, no reply                      | writes `-ERR <message>`             |
//! | `Err`, complete reply already sent   | logs the error                      |
//! | reply left mid-array (any outcome)   | [`DispatchError::IncompleteReply`]  |
//!
//! A second top-level reply is refused with [`ReplyError::AlreadyReplied`]
//! and never reaches the wire.

use crate::commands::{Context, Extension, RedisConn, ReplyError};
use crate::protocol::RespValue;
use crate::shutdown::Shutdown;
use std::fmt::Display;
use tracing::{debug, warn};

/// Fatal dispatch failures; the connection must be closed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Writing the reply failed
    #[error("reply failed: {0}")]
    Reply(#[from] ReplyError),

    /// The handler announced more array elements than it wrote
    #[error("handler for '{0}' left its reply incomplete")]
    IncompleteReply(String),
}

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The handler's own reply (or the default null reply) was sent
    Reply,
    /// An error reply was sent
    ErrorReply,
}

/// Wraps a connection and tracks RESP frame boundaries.
pub struct ReplyGuard<'a> {
    inner: &'a mut dyn RedisConn,
    /// Elements still owed by each open array, innermost last
    open_arrays: Vec<usize>,
    completed: usize,
}

impl<'a> ReplyGuard<'a> {
    pub fn new(inner: &'a mut dyn RedisConn) -> Self {
        Self {
            inner,
            open_arrays: Vec::new(),
            completed: 0,
        }
    }

    /// True once at least one top-level frame is complete.
    pub fn replied(&self) -> bool {
        self.completed > 0
    }

    /// True while an array header is waiting for elements.
    pub fn is_partial(&self) -> bool {
        !self.open_arrays.is_empty()
    }

    fn check_can_start(&self) -> Result<(), ReplyError> {
        if self.open_arrays.is_empty() && self.completed > 0 {
            return Err(ReplyError::AlreadyReplied);
        }
        Ok(())
    }

    fn value_completed(&mut self) {
        while let Some(remaining) = self.open_arrays.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                return;
            }
            // A finished array is itself one element of its parent
            self.open_arrays.pop();
        }
        self.completed += 1;
    }
}

impl RedisConn for ReplyGuard<'_> {
    fn write_string(&mut self, s: &str) -> Result<(), ReplyError> {
        self.check_can_start()?;
        self.inner.write_string(s)?;
        self.value_completed();
        Ok(())
    }

    fn write_int(&mut self, i: i64) -> Result<(), ReplyError> {
        self.check_can_start()?;
        self.inner.write_int(i)?;
        self.value_completed();
        Ok(())
    }

    fn write_array(&mut self, length: i64) -> Result<(), ReplyError> {
        self.check_can_start()?;
        self.inner.write_array(length)?;
        if length > 0 {
            self.open_arrays.push(length as usize);
        } else {
            self.value_completed();
        }
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), ReplyError> {
        self.check_can_start()?;
        self.inner.write_null()?;
        self.value_completed();
        Ok(())
    }

    fn write_error(&mut self, err: &dyn Display) -> Result<(), ReplyError> {
        self.check_can_start()?;
        self.inner.write_error(err)?;
        self.value_completed();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReplyError> {
        self.inner.flush()
    }
}

/// Dispatches one decoded request and writes its reply to `conn`.
pub fn dispatch(
    extension: &Extension,
    request: RespValue,
    conn: &mut dyn RedisConn,
    shutdown: Option<&Shutdown>,
) -> Result<Dispatched, DispatchError> {
    let args = match request_args(request) {
        Ok(args) => args,
        Err(reason) => return reply_error(conn, reason),
    };

    let name = &args[0];
    let command = match extension.lookup(name) {
        Ok(command) => command,
        Err(e) => {
            debug!(command = %name, "Unknown command");
            return reply_error(conn, e);
        }
    };

    if !command.accepts(args.len()) {
        return reply_error(
            conn,
            format!("wrong number of arguments for '{}' command", command.name()),
        );
    }

    let command_name = command.name().to_string();
    let mut guard = ReplyGuard::new(conn);
    let result = {
        let mut ctx = Context::new(args, &mut guard);
        if let Some(shutdown) = shutdown {
            ctx = ctx.with_shutdown(shutdown.clone());
        }
        command.call(&mut ctx)
    };

    let failure = match result {
        Ok(()) => None,
        Err(e) => match e.downcast::<ReplyError>() {
            Ok(ReplyError::Io(io)) => return Err(ReplyError::Io(io).into()),
            Ok(other) => Some(anyhow::Error::from(other)),
            Err(e) => Some(e),
        },
    };

    if guard.is_partial() {
        warn!(command = %command_name, "Handler left an array reply incomplete");
        return Err(DispatchError::IncompleteReply(command_name));
    }

    let replied = guard.replied();
    let outcome = match failure {
        None if replied => Dispatched::Reply,
        None => {
            guard.write_null()?;
            Dispatched::Reply
        }
        Some(e) => {
            let message = format!("{:#}", e);
            if replied {
                warn!(command = %command_name, error = %message, "Handler failed after replying");
                Dispatched::Reply
            } else {
                debug!(command = %command_name, error = %message, "Handler failed");
                guard.write_error(&error_message(&message))?;
                Dispatched::ErrorReply
            }
        }
    };

    guard.flush()?;
    Ok(outcome)
}

/// Extracts the string arguments of a request.
///
/// Element 0 must be a string; the rest are coerced: bulk strings as
/// (lossy) UTF-8, integers in decimal, the null bulk string as "".
fn request_args(request: RespValue) -> Result<Vec<String>, &'static str> {
    let elements = match request {
        RespValue::Array(elements) => elements,
        _ => return Err("invalid command format"),
    };

    if elements.is_empty() {
        return Err("empty command");
    }

    if !matches!(
        elements[0],
        RespValue::BulkString(_) | RespValue::SimpleString(_)
    ) {
        return Err("invalid command name");
    }

    elements
        .into_iter()
        .map(|element| match element {
            RespValue::BulkString(data) => Ok(String::from_utf8_lossy(&data).into_owned()),
            RespValue::SimpleString(s) | RespValue::Error(s) => Ok(s),
            RespValue::Integer(n) => Ok(n.to_string()),
            RespValue::Null => Ok(String::new()),
            RespValue::Array(_) | RespValue::NullArray => Err("invalid argument type"),
        })
        .collect()
}

fn reply_error(
    conn: &mut dyn RedisConn,
    reason: impl Display,
) -> Result<Dispatched, DispatchError> {
    conn.write_error(&error_message(&reason.to_string()))?;
    conn.flush()?;
    Ok(Dispatched::ErrorReply)
}

/// Builds a single-line error reply.
///
/// Messages that already start with an upper-case error code (`ERR`,
/// `WRONGTYPE`, ...) are kept; everything else gets the `ERR` prefix.
fn error_message(message: &str) -> String {
    let line: String = message
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();

    let code = line.split(' ').next().unwrap_or_default();
    let has_code = line.contains(' ')
        && !code.is_empty()
        && code.chars().all(|c| c.is_ascii_uppercase());

    if has_code {
        line
    } else {
        format!("ERR {}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::tests::RecordingConn;
    use crate::commands::Command;
    use anyhow::bail;

    fn extension() -> Extension {
        let ext = Extension::new("test");
        ext.register(
            Command::new("ECHO.FIRST")
                .description("Replies with the second argument verbatim")
                .arity(2, 2)
                .handler(|ctx| {
                    let first = ctx.arg(1).unwrap_or_default().to_string();
                    Ok(ctx.reply(&first)?)
                }),
        )
        .unwrap();
        ext.register(Command::new("SILENT").handler(|_| Ok(())))
            .unwrap();
        ext.register(Command::new("FAIL").handler(|_| bail!("usage: FAIL <nothing>")))
            .unwrap();
        ext.register(Command::new("CODED").handler(|_| bail!("WRONGTYPE not a list")))
            .unwrap();
        ext.register(Command::new("TWICE").handler(|ctx| {
            ctx.reply("first")?;
            ctx.reply("second")?;
            Ok(())
        }))
        .unwrap();
        ext.register(Command::new("REPLY.THEN.FAIL").handler(|ctx| {
            ctx.reply_int(1)?;
            bail!("too late")
        }))
        .unwrap();
        ext.register(Command::new("LIST").handler(|ctx| {
            ctx.reply_array(2)?;
            ctx.reply_array(1)?;
            ctx.reply("nested")?;
            ctx.reply_int(2)?;
            Ok(())
        }))
        .unwrap();
        ext.register(Command::new("SHORT.LIST").handler(|ctx| {
            ctx.reply_array(3)?;
            ctx.reply("only one")?;
            Ok(())
        }))
        .unwrap();
        ext.register(Command::new("MULTI.LINE").handler(|_| bail!("line one\r\nline two")))
            .unwrap();
        ext
    }

    fn run(request: RespValue) -> (Result<Dispatched, DispatchError>, RecordingConn) {
        let ext = extension();
        let mut conn = RecordingConn::default();
        let result = dispatch(&ext, request, &mut conn, None);
        (result, conn)
    }

    #[test]
    fn test_echo_first() {
        let (result, conn) = run(RespValue::command(["ECHO.FIRST", "world"]));
        assert_eq!(result.unwrap(), Dispatched::Reply);
        assert_eq!(conn.bytes(), b"$5\r\nworld\r\n");
        assert_eq!(conn.flushes, 1);
    }

    #[test]
    fn test_unknown_command_is_error_reply() {
        let (result, conn) = run(RespValue::command(["ECHO", "world"]));
        assert_eq!(result.unwrap(), Dispatched::ErrorReply);
        assert_eq!(conn.bytes(), b"-ERR unknown command 'ECHO'\r\n");
    }

    #[test]
    fn test_wrong_arity() {
        let (result, conn) = run(RespValue::command(["ECHO.FIRST"]));
        assert_eq!(result.unwrap(), Dispatched::ErrorReply);
        assert_eq!(
            conn.replies(),
            vec![RespValue::error(
                "ERR wrong number of arguments for 'ECHO.FIRST' command"
            )]
        );
    }

    #[test]
    fn test_invalid_request_shapes() {
        let cases = [
            (RespValue::integer(1), "ERR invalid command format"),
            (RespValue::NullArray, "ERR invalid command format"),
            (RespValue::array(vec![]), "ERR empty command"),
            (
                RespValue::array(vec![RespValue::integer(5)]),
                "ERR invalid command name",
            ),
            (
                RespValue::array(vec![
                    RespValue::bulk_string("ECHO.FIRST"),
                    RespValue::array(vec![]),
                ]),
                "ERR invalid argument type",
            ),
        ];

        for (request, expected) in cases {
            let (result, conn) = run(request);
            assert_eq!(result.unwrap(), Dispatched::ErrorReply);
            assert_eq!(conn.replies(), vec![RespValue::error(expected)]);
        }
    }

    #[test]
    fn test_argument_coercion() {
        let request = RespValue::array(vec![
            RespValue::bulk_string("ECHO.FIRST"),
            RespValue::integer(42),
        ]);
        let (_, conn) = run(request);
        assert_eq!(conn.replies(), vec![RespValue::bulk_string("42")]);
    }

    #[test]
    fn test_null_argument_becomes_empty_string() {
        let request = RespValue::array(vec![RespValue::bulk_string("ECHO.FIRST"), RespValue::Null]);
        let (result, conn) = run(request);
        assert_eq!(result.unwrap(), Dispatched::Reply);
        // An empty string reply goes out as the null bulk string
        assert_eq!(conn.bytes(), b"$-1\r\n");
    }

    #[test]
    fn test_silent_handler_gets_null_reply() {
        let (result, conn) = run(RespValue::command(["SILENT"]));
        assert_eq!(result.unwrap(), Dispatched::Reply);
        assert_eq!(conn.replies(), vec![RespValue::Null]);
    }

    #[test]
    fn test_handler_error_is_error_reply() {
        let (result, conn) = run(RespValue::command(["FAIL"]));
        assert_eq!(result.unwrap(), Dispatched::ErrorReply);
        assert_eq!(
            conn.replies(),
            vec![RespValue::error("ERR usage: FAIL <nothing>")]
        );
    }

    #[test]
    fn test_error_code_is_preserved() {
        let (_, conn) = run(RespValue::command(["CODED"]));
        assert_eq!(conn.replies(), vec![RespValue::error("WRONGTYPE not a list")]);
    }

    #[test]
    fn test_error_message_is_single_line() {
        let (_, conn) = run(RespValue::command(["MULTI.LINE"]));
        assert_eq!(
            conn.replies(),
            vec![RespValue::error("ERR line one  line two")]
        );
    }

    #[test]
    fn test_second_reply_is_refused() {
        let (result, conn) = run(RespValue::command(["TWICE"]));
        assert_eq!(result.unwrap(), Dispatched::Reply);
        assert_eq!(conn.replies(), vec![RespValue::bulk_string("first")]);
    }

    #[test]
    fn test_error_after_reply_is_not_written() {
        let (result, conn) = run(RespValue::command(["REPLY.THEN.FAIL"]));
        assert_eq!(result.unwrap(), Dispatched::Reply);
        assert_eq!(conn.replies(), vec![RespValue::Integer(1)]);
    }

    #[test]
    fn test_nested_array_reply_counts_as_one_frame() {
        let (result, conn) = run(RespValue::command(["LIST"]));
        assert_eq!(result.unwrap(), Dispatched::Reply);
        assert_eq!(
            conn.replies(),
            vec![RespValue::array(vec![
                RespValue::array(vec![RespValue::bulk_string("nested")]),
                RespValue::Integer(2),
            ])]
        );
    }

    #[test]
    fn test_incomplete_array_is_fatal() {
        let (result, _) = run(RespValue::command(["SHORT.LIST"]));
        assert!(matches!(
            result,
            Err(DispatchError::IncompleteReply(name)) if name == "SHORT.LIST"
        ));
    }

    #[test]
    fn test_reply_guard_tracks_frames() {
        let mut inner = RecordingConn::default();
        let mut guard = ReplyGuard::new(&mut inner);

        guard.write_array(2).unwrap();
        assert!(guard.is_partial());
        guard.write_array(0).unwrap();
        assert!(guard.is_partial());
        guard.write_null().unwrap();
        assert!(!guard.is_partial());
        assert!(guard.replied());

        assert!(matches!(
            guard.write_int(1),
            Err(ReplyError::AlreadyReplied)
        ));
    }

    #[test]
    fn test_error_message_prefixing() {
        assert_eq!(error_message("boom"), "ERR boom");
        assert_eq!(error_message("ERR boom"), "ERR boom");
        assert_eq!(error_message("NOAUTH needed"), "NOAUTH needed");
        assert_eq!(error_message("OK"), "ERR OK");
    }
}
