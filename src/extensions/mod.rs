//! Bundled Extensions
//!
//! Ready-made command sets that the server binary registers at startup.
//! Each submodule exposes a `register` function that installs its commands
//! into a shared [`Extension`](crate::commands::Extension).

pub mod hello;
pub mod ratelimit;

pub use ratelimit::RateLimiter;
