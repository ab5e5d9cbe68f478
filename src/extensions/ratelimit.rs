//! Sliding-window rate limiter
//!
//! - `RATELIMIT.ALLOW <key> <max_requests> <window_seconds>` replies `"1"`
//!   and records the request when fewer than `max_requests` were recorded
//!   in the last `window_seconds`, otherwise `"0"`.
//! - `RATELIMIT.INFO <key>` replies a summary of the last hour.
//!
//! Every access prunes the key's entries older than [`RETENTION`].

use crate::commands::{Command, Extension, RegistryError};
use anyhow::Context as _;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How long a recorded request is remembered
pub const RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
struct Window {
    timestamp: Instant,
    count: u64,
}

/// Summary returned by [`RateLimiter::info_at`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    /// Requests recorded within [`RETENTION`]
    pub total_requests: u64,
    /// Number of stored windows for the key
    pub window_count: usize,
}

/// Per-key request log shared by the rate-limit commands.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and records one request for `key` at the current time.
    pub fn allow(&self, key: &str, max_requests: i64, window: Duration) -> bool {
        self.allow_at(key, max_requests, window, Instant::now())
    }

    /// Same as [`allow`](Self::allow) with an explicit clock reading.
    pub fn allow_at(&self, key: &str, max_requests: i64, window: Duration, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut windows, key, now);

        let in_window: u64 = windows
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|w| now.saturating_duration_since(w.timestamp) < window)
                    .map(|w| w.count)
                    .sum()
            })
            .unwrap_or(0);

        if i128::from(in_window) >= i128::from(max_requests) {
            return false;
        }

        windows.entry(key.to_string()).or_default().push(Window {
            timestamp: now,
            count: 1,
        });
        true
    }

    pub fn info(&self, key: &str) -> KeyInfo {
        self.info_at(key, Instant::now())
    }

    pub fn info_at(&self, key: &str, now: Instant) -> KeyInfo {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut windows, key, now);

        match windows.get(key) {
            Some(entries) => KeyInfo {
                total_requests: entries.iter().map(|w| w.count).sum(),
                window_count: entries.len(),
            },
            None => KeyInfo {
                total_requests: 0,
                window_count: 0,
            },
        }
    }

    /// Number of keys with at least one retained request.
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn prune(windows: &mut HashMap<String, Vec<Window>>, key: &str, now: Instant) {
    if let Some(entries) = windows.get_mut(key) {
        entries.retain(|w| now.saturating_duration_since(w.timestamp) < RETENTION);
        if entries.is_empty() {
            windows.remove(key);
        }
    }
}

/// Registers the commands against a fresh limiter.
pub fn register(ext: &Extension) -> Result<(), RegistryError> {
    register_with(ext, Arc::new(RateLimiter::new()))
}

/// Registers the commands against `limiter`.
pub fn register_with(ext: &Extension, limiter: Arc<RateLimiter>) -> Result<(), RegistryError> {
    let allow_limiter = Arc::clone(&limiter);
    ext.register(
        Command::new("RATELIMIT.ALLOW")
            .description("Check if request is allowed under rate limit")
            .arity(4, 4)
            .handler(move |ctx| {
                let key = ctx.arg(1).unwrap_or_default().to_string();
                let max_requests: i64 = ctx
                    .arg(2)
                    .unwrap_or_default()
                    .parse()
                    .context("invalid max_requests")?;
                let window_seconds: u64 = ctx
                    .arg(3)
                    .unwrap_or_default()
                    .parse()
                    .context("invalid window_seconds")?;

                let allowed =
                    allow_limiter.allow(&key, max_requests, Duration::from_secs(window_seconds));
                Ok(ctx.reply(if allowed { "1" } else { "0" })?)
            }),
    )?;

    ext.register(
        Command::new("RATELIMIT.INFO")
            .description("Get rate limit information for a key")
            .arity(2, 2)
            .handler(move |ctx| {
                let key = ctx.arg(1).unwrap_or_default().to_string();
                let info = limiter.info(&key);
                let summary = format!(
                    "{{\"key\":{:?},\"total_requests\":{},\"window_count\":{}}}",
                    key, info.total_requests, info.window_count
                );
                Ok(ctx.reply(&summary)?)
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::context::tests::RecordingConn;
    use crate::connection::{dispatch, Dispatched};
    use crate::protocol::RespValue;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.allow_at("user", 2, MINUTE, now));
        assert!(limiter.allow_at("user", 2, MINUTE, now));
        assert!(!limiter.allow_at("user", 2, MINUTE, now));

        // Other keys are independent
        assert!(limiter.allow_at("other", 2, MINUTE, now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.allow_at("k", 1, MINUTE, start));
        assert!(!limiter.allow_at("k", 1, MINUTE, start + Duration::from_secs(30)));
        assert!(limiter.allow_at("k", 1, MINUTE, start + Duration::from_secs(61)));
    }

    #[test]
    fn test_non_positive_limit_never_allows() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        assert!(!limiter.allow_at("k", 0, MINUTE, now));
        assert!(!limiter.allow_at("k", -5, MINUTE, now));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_info_counts_last_hour_and_prunes() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for i in 0..3 {
            assert!(limiter.allow_at("k", 10, MINUTE, start + Duration::from_secs(i)));
        }
        assert_eq!(
            limiter.info_at("k", start + Duration::from_secs(10)),
            KeyInfo {
                total_requests: 3,
                window_count: 3
            }
        );

        let later = start + RETENTION + Duration::from_secs(5);
        assert_eq!(
            limiter.info_at("k", later),
            KeyInfo {
                total_requests: 0,
                window_count: 0
            }
        );
        assert_eq!(limiter.tracked_keys(), 0);
    }

    fn run(ext: &Extension, args: &[&str]) -> (Dispatched, Vec<RespValue>) {
        let mut conn = RecordingConn::default();
        let outcome = dispatch(ext, RespValue::command(args), &mut conn, None).unwrap();
        (outcome, conn.replies())
    }

    #[test]
    fn test_commands_through_dispatch() {
        let ext = Extension::new("ratelimit");
        register(&ext).unwrap();

        let allow = ["RATELIMIT.ALLOW", "api", "1", "60"];
        assert_eq!(run(&ext, &allow).1, vec![RespValue::bulk_string("1")]);
        assert_eq!(run(&ext, &allow).1, vec![RespValue::bulk_string("0")]);

        let (outcome, replies) = run(&ext, &["RATELIMIT.INFO", "api"]);
        assert_eq!(outcome, Dispatched::Reply);
        assert_eq!(
            replies,
            vec![RespValue::bulk_string(
                r#"{"key":"api","total_requests":1,"window_count":1}"#
            )]
        );
    }

    #[test]
    fn test_invalid_numbers_reply_errors() {
        let ext = Extension::new("ratelimit");
        register(&ext).unwrap();

        let (outcome, replies) = run(&ext, &["RATELIMIT.ALLOW", "api", "many", "60"]);
        assert_eq!(outcome, Dispatched::ErrorReply);
        match &replies[0] {
            RespValue::Error(msg) => assert!(msg.starts_with("ERR invalid max_requests")),
            other => panic!("expected error, got {:?}", other),
        }

        let (outcome, _) = run(&ext, &["RATELIMIT.ALLOW", "api", "5", "-1"]);
        assert_eq!(outcome, Dispatched::ErrorReply);
    }

    #[test]
    fn test_shared_limiter() {
        let ext = Extension::new("ratelimit");
        let limiter = Arc::new(RateLimiter::new());
        register_with(&ext, Arc::clone(&limiter)).unwrap();

        run(&ext, &["RATELIMIT.ALLOW", "a", "5", "60"]);
        run(&ext, &["RATELIMIT.ALLOW", "b", "5", "60"]);
        assert_eq!(limiter.tracked_keys(), 2);
    }
}
