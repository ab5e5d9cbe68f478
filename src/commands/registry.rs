//! Command Registry
//!
//! An [`Extension`] groups related commands under one name and is the only
//! state the core shares between connections. It is guarded by a single
//! `RwLock`: lookups (the hot path) share the read lock, registrations take
//! the write lock.
//!
//! Registering a name that already exists replaces the previous command.
//! Lookups are exact and case-sensitive.

use crate::commands::command::Command;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Errors from registering or resolving commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The command's metadata is inconsistent
    #[error("invalid command '{name}': {reason}")]
    InvalidCommand { name: String, reason: String },

    #[error("command name cannot be empty")]
    EmptyName,

    #[error("command '{0}' has no handler")]
    MissingHandler(String),

    #[error("unknown command '{0}'")]
    CommandNotFound(String),
}

/// A named, thread-safe collection of commands.
///
/// # Example
///
/// ```
/// use respext::commands::{Command, Extension};
///
/// let ext = Extension::new("hello-world");
/// ext.register(Command::new("HELLO.WORLD").handler(|ctx| Ok(ctx.reply("Hello, World!")?)))
///     .unwrap();
///
/// assert!(ext.lookup("HELLO.WORLD").is_ok());
/// assert!(ext.lookup("hello.world").is_err());
/// ```
#[derive(Debug)]
pub struct Extension {
    name: String,
    commands: RwLock<HashMap<String, Arc<Command>>>,
}

impl Extension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a command, replacing any command with the same name.
    pub fn register(&self, command: Command) -> Result<(), RegistryError> {
        if command.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        if !command.has_handler() {
            return Err(RegistryError::MissingHandler(command.name().to_string()));
        }

        if let Some(max) = command.max_args() {
            if max < command.min_args() {
                return Err(RegistryError::InvalidCommand {
                    name: command.name().to_string(),
                    reason: format!(
                        "max_args {} is below min_args {}",
                        max,
                        command.min_args()
                    ),
                });
            }
        }

        let name = command.name().to_string();
        let previous = self
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(command));

        debug!(
            extension = %self.name,
            command = %name,
            replaced = previous.is_some(),
            "Registered command"
        );
        Ok(())
    }

    /// Resolves a command by its exact name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Command>, RegistryError> {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::CommandNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
