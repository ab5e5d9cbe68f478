//! Connection Module
//!
//! This module glues the protocol codec to the command layer for one client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ RespReader  │───>│  dispatch() │───>│ WriterConn  │      │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘      │
//! │                            │                                │
//! │                            ▼                                │
//! │                 Extension ──> Command ──> Context           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pieces
//!
//! - `conn`: [`WriterConn`], the RESP-writer implementation of `RedisConn`
//! - `dispatch`: request → command → exactly one reply
//! - `handler`: the per-connection read/dispatch/write loop and statistics

pub mod conn;
pub mod dispatch;
pub mod handler;

pub use conn::WriterConn;
pub use dispatch::{dispatch, DispatchError, Dispatched, ReplyGuard};
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
