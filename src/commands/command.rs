//! Command definitions
//!
//! A [`Command`] pairs a name with a handler closure and declarative arity
//! metadata. Arity counts every argument, including the command name at
//! index 0.

use crate::commands::context::Context;
use crate::commands::registry::RegistryError;
use std::fmt;
use std::sync::Arc;

/// Handler closure type stored in a [`Command`].
///
/// A handler emits its reply through the [`Context`]. Returning `Err`
/// before replying makes the dispatcher send the error to the client.
pub type HandlerFn = dyn Fn(&mut Context<'_>) -> anyhow::Result<()> + Send + Sync;

/// A named, arity-constrained unit of behavior.
///
/// # Example
///
/// ```
/// use respext::commands::Command;
///
/// let cmd = Command::new("ECHO.FIRST")
///     .description("Replies with the first argument")
///     .arity(2, 2)
///     .handler(|ctx| {
///         let first = ctx.arg(1).unwrap_or_default().to_string();
///         Ok(ctx.reply(&first)?)
///     });
///
/// assert!(cmd.accepts(2));
/// assert!(!cmd.accepts(3));
/// ```
#[derive(Clone)]
pub struct Command {
    name: String,
    handler: Option<Arc<HandlerFn>>,
    min_args: usize,
    /// `None` means unbounded
    max_args: Option<usize>,
    description: String,
}

impl Command {
    /// Creates a command that accepts any number of arguments and has no handler yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            min_args: 0,
            max_args: None,
            description: String::new(),
        }
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets the accepted total argument count; `max` of `None` is unbounded.
    pub fn arity(mut self, min: usize, max: impl Into<Option<usize>>) -> Self {
        self.min_args = min;
        self.max_args = max.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    pub fn get_description(&self) -> &str {
        &self.description
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Returns true if `total` arguments (name included) satisfy the arity.
    pub fn accepts(&self, total: usize) -> bool {
        total >= self.min_args && self.max_args.map_or(true, |max| total <= max)
    }

    /// Runs the handler.
    pub fn call(&self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        match &self.handler {
            Some(handler) => handler(ctx),
            None => Err(RegistryError::MissingHandler(self.name.clone()).into()),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::tests::RecordingConn;
    use crate::protocol::RespValue;

    #[test]
    fn test_defaults() {
        let cmd = Command::new("X");
        assert_eq!(cmd.name(), "X");
        assert_eq!(cmd.min_args(), 0);
        assert_eq!(cmd.max_args(), None);
        assert!(!cmd.has_handler());
        assert!(cmd.accepts(0));
        assert!(cmd.accepts(1000));
    }

    #[test]
    fn test_arity_bounds() {
        let cmd = Command::new("X").arity(2, 4);
        assert!(!cmd.accepts(1));
        assert!(cmd.accepts(2));
        assert!(cmd.accepts(4));
        assert!(!cmd.accepts(5));

        let open = Command::new("Y").arity(3, None);
        assert!(!open.accepts(2));
        assert!(open.accepts(30));
    }

    #[test]
    fn test_call_runs_handler() {
        let cmd = Command::new("PING").handler(|ctx| Ok(ctx.reply("PONG")?));
        let mut conn = RecordingConn::default();
        let mut ctx = Context::new(vec!["PING".to_string()], &mut conn);

        cmd.call(&mut ctx).unwrap();
        assert_eq!(conn.replies(), vec![RespValue::bulk_string("PONG")]);
    }

    #[test]
    fn test_call_without_handler_fails() {
        let cmd = Command::new("NOPE");
        let mut conn = RecordingConn::default();
        let mut ctx = Context::new(vec!["NOPE".to_string()], &mut conn);

        let err = cmd.call(&mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::MissingHandler(name)) if name == "NOPE"
        ));
    }
}
