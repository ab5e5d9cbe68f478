//! Command Layer
//!
//! This module defines what a command is and how handlers talk back to the
//! client.
//!
//! ## Architecture
//!
//! ```text
//! Decoded request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   Extension     │  name → Arc<Command>, RwLock-guarded
//! └────────┬────────┘
//!          │ lookup
//!          ▼
//! ┌─────────────────┐
//! │    Command      │  handler + arity metadata
//! └────────┬────────┘
//!          │ call
//!          ▼
//! ┌─────────────────┐
//! │    Context      │  args + &mut dyn RedisConn
//! └────────┬────────┘
//!          │ reply helpers
//!          ▼
//! ┌─────────────────┐
//! │   RedisConn     │  transport capability set
//! └─────────────────┘
//! ```
//!
//! Enforcing arity and the one-reply-per-request rule is the dispatcher's
//! job (see [`crate::connection::dispatch`]); the types here only describe.

pub mod command;
pub mod context;
pub mod registry;

pub use command::{Command, HandlerFn};
pub use context::{Context, RedisConn, ReplyError};
pub use registry::{Extension, RegistryError};
