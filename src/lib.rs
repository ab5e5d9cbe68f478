//! # respext - Redis-Compatible Command Extensions
//!
//! respext lets you define custom commands in Rust and serve them to any
//! Redis client over the RESP protocol.
//!
//! ## Features
//!
//! - **RESP codec**: incremental parser, async [`RespReader`] and a
//!   flushing [`RespWriter`]
//! - **Command registry**: named [`Command`]s with arity checks, grouped in
//!   an [`Extension`] that is safe to share across threads
//! - **Reply discipline**: every request gets exactly one reply, even when a
//!   handler forgets to answer or fails
//! - **Async I/O**: one Tokio task per client connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               respext                               │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  dispatch   │              │
//! │  │ (server.rs) │    │  Handler    │    │             │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌──────────────────────────┐ │
//! │                     │ RespReader  │    │        Extension         │ │
//! │                     │ RespWriter  │    │  name ──> Command        │ │
//! │                     └─────────────┘    │  handler(&mut Context)   │ │
//! │                                        └──────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use respext::commands::{Command, Extension};
//! use respext::connection::ConnectionStats;
//! use respext::server::{self, ServerConfig};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ext = Extension::new("greetings");
//!     ext.register(
//!         Command::new("HELLO.WORLD")
//!             .arity(1, 2)
//!             .handler(|ctx| {
//!                 let name = ctx.arg(1).unwrap_or("World").to_string();
//!                 Ok(ctx.reply(&format!("Hello, {}!", name))?)
//!             }),
//!     )?;
//!
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     let (_trigger, shutdown) = respext::shutdown::channel();
//!
//!     server::run(
//!         listener,
//!         Arc::new(ext),
//!         Arc::new(ConnectionStats::new()),
//!         &config,
//!         shutdown,
//!     )
//!     .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types, parser, reader and writer
//! - [`commands`]: commands, the execution context and the registry
//! - [`connection`]: dispatch and the per-client connection loop
//! - [`server`]: listener configuration and the accept loop
//! - [`extensions`]: bundled command sets
//! - [`shutdown`]: cooperative shutdown signal
//!
//! ## Design Highlights
//!
//! ### Synchronous Handlers
//!
//! Handlers are plain closures writing into an in-memory [`RedisConn`]. The
//! connection task sends the encoded reply to the socket once the handler
//! returns, so handlers never hold a borrow across an `.await`.
//!
//! ### Zero-Copy Parsing
//!
//! The RESP parser uses `bytes::Bytes` to avoid copying bulk payloads.

pub mod commands;
pub mod connection;
pub mod extensions;
pub mod protocol;
pub mod server;
pub mod shutdown;

// Re-export commonly used types for convenience
pub use commands::{Command, Context, Extension, RedisConn, RegistryError, ReplyError};
pub use connection::{dispatch, handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespReader, RespValue, RespWriter};
pub use server::ServerConfig;

/// The default port respext listens on
pub const DEFAULT_PORT: u16 = 6380;

/// The default host respext binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respext
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
