//! Sliding-window request rate limiter.
//!
//! Bounds the number of calls made against a shared external resource
//! (the search provider, the research endpoint) within any window-wide
//! interval. Each key keeps a log of the instants it admitted requests at;
//! instants older than the window are pruned before counting.
//! One [`RateLimiter`] is constructed per process and shared via `Arc`;
//! each logical resource uses its own key under the configured prefix.
//!
//! Callers should use [`RateLimiter::acquire`], which performs
//! check-then-record under a single lock so concurrent callers can never
//! push a window past `max_requests`. The split [`check`](RateLimiter::check) /
//! [`record`](RateLimiter::record) / [`retry`](RateLimiter::retry) calls are
//! exposed for callers that meter work they have already admitted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::RateLimitError;

/// Default requests allowed per window.
const DEFAULT_MAX_REQUESTS: u32 = 60;
/// Default window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default number of waits before giving up.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Shortest sleep between retries, so a window that just expired is re-read.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted within any window-wide interval.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Waits attempted by [`RateLimiter::retry`] and [`RateLimiter::acquire`].
    pub max_retries: u32,
    /// Prefix applied to every key.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            max_retries: DEFAULT_MAX_RETRIES,
            key_prefix: "deepsearch".to_string(),
        }
    }
}

/// Snapshot of a key's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether one more request fits in the current window.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// Time until the next logged request leaves the window (when
    /// throttled, the one whose expiry frees a slot).
    pub reset_in: Duration,
}

/// Admission log for one key, oldest first.
#[derive(Debug, Default)]
struct RequestLog {
    requests: VecDeque<Instant>,
}

impl RequestLog {
    fn in_window(&self, now: Instant, window: Duration) -> impl Iterator<Item = &Instant> {
        self.requests
            .iter()
            .filter(move |t| now.duration_since(**t) < window)
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while self
            .requests
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            self.requests.pop_front();
        }
    }
}

/// Process-wide rate limiter keyed by resource name.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    logs: Mutex<HashMap<String, RequestLog>>,
}

impl RateLimiter {
    /// Creates a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            logs: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a limiter that never throttles.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(RateLimitConfig {
            max_requests: u32::MAX,
            ..RateLimitConfig::default()
        })
    }

    /// Returns the limiter configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.config.key_prefix)
    }

    fn status_of(&self, log: Option<&RequestLog>, now: Instant) -> RateLimitStatus {
        let max = self.config.max_requests;
        let window = self.config.window;
        let live: Vec<Instant> = log
            .map(|log| log.in_window(now, window).copied().collect())
            .unwrap_or_default();
        let count = u32::try_from(live.len()).unwrap_or(u32::MAX);
        // When throttled, capacity returns once enough of the oldest
        // requests have aged out to bring the count below `max`.
        let pivot = if count >= max {
            usize::try_from(max)
                .ok()
                .and_then(|max| live.len().checked_sub(max))
                .and_then(|idx| live.get(idx))
        } else {
            live.first()
        };
        RateLimitStatus {
            allowed: count < max,
            remaining: max.saturating_sub(count),
            reset_in: pivot.map_or(window, |t| window - now.duration_since(*t)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RequestLog>> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reports whether `key` has capacity, without consuming any.
    pub fn check(&self, key: &str) -> RateLimitStatus {
        let logs = self.lock();
        self.status_of(logs.get(&self.full_key(key)), Instant::now())
    }

    /// Logs one request against `key`, dropping instants that have left
    /// the window.
    pub fn record(&self, key: &str) {
        let mut logs = self.lock();
        self.record_locked(&mut logs, self.full_key(key), Instant::now());
    }

    fn record_locked(&self, logs: &mut HashMap<String, RequestLog>, key: String, now: Instant) {
        let log = logs.entry(key).or_default();
        log.prune(now, self.config.window);
        log.requests.push_back(now);
    }

    /// Waits for `key` to regain capacity, re-checking each time the oldest
    /// logged request leaves the window, at most `max_retries` times. Does
    /// not record a request.
    pub async fn retry(&self, key: &str) -> Result<(), RateLimitError> {
        for attempt in 1..=self.config.max_retries {
            let status = self.check(key);
            debug!(key, attempt, wait = ?status.reset_in, "rate limited, waiting");
            tokio::time::sleep(status.reset_in.max(MIN_RETRY_DELAY)).await;
            if self.check(key).allowed {
                return Ok(());
            }
        }
        warn!(key, retries = self.config.max_retries, "rate limit retries exhausted");
        Err(RateLimitError::Exhausted {
            key: key.to_string(),
            retries: self.config.max_retries,
        })
    }

    /// Admits one request against `key`, waiting for capacity when
    /// throttled. Check and record happen under one lock.
    pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
        let full_key = self.full_key(key);
        let mut retries = 0;
        loop {
            let wait = {
                let mut logs = self.lock();
                let now = Instant::now();
                let status = self.status_of(logs.get(&full_key), now);
                if status.allowed {
                    self.record_locked(&mut logs, full_key, now);
                    return Ok(());
                }
                status.reset_in
            };

            if retries >= self.config.max_retries {
                warn!(key, retries, "rate limit retries exhausted");
                return Err(RateLimitError::Exhausted {
                    key: key.to_string(),
                    retries,
                });
            }
            retries += 1;
            debug!(key, attempt = retries, wait = ?wait, "rate limited, waiting");
            tokio::time::sleep(wait.max(MIN_RETRY_DELAY)).await;
        }
    }
}
