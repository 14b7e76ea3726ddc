//! Failed-login rate limiting
//!
//! A sliding window over attempts per client source. An attempt is reserved
//! before credentials are checked and released again when they turn out to
//! be correct, so concurrent guesses count against the window while they are
//! still in flight.
//!
//! The store is pluggable: [`InMemoryAttemptStore`] serves a single
//! instance, a shared cache can implement [`AttemptStore`] for several.

use carelink_shared::{HealthError, HealthResult, SharedClock};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

pub const DEFAULT_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_WINDOW_MINUTES: i64 = 15;

/// Storage for attempt timestamps
pub trait AttemptStore: Send + Sync {
    /// Drop attempts at or before `since` and return how many remain
    fn prune_and_count(&self, key: &str, since: DateTime<Utc>) -> usize;

    /// Drop attempts at or before `since`; when fewer than `max` remain,
    /// record one at `at` and return true. Must be atomic per key.
    fn try_reserve(&self, key: &str, at: DateTime<Utc>, since: DateTime<Utc>, max: usize) -> bool;

    /// Forget one attempt recorded at `at`
    fn release(&self, key: &str, at: DateTime<Utc>);
}

/// Process-local attempt store
///
/// Each key's entry lock covers the whole prune-count-record sequence.
#[derive(Debug, Default)]
pub struct InMemoryAttemptStore {
    attempts: DashMap<String, Vec<DateTime<Utc>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources currently tracked
    pub fn tracked_sources(&self) -> usize {
        self.attempts.len()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn prune_and_count(&self, key: &str, since: DateTime<Utc>) -> usize {
        let remaining = match self.attempts.get_mut(key) {
            Some(mut entry) => {
                entry.retain(|at| *at > since);
                entry.len()
            }
            None => return 0,
        };
        if remaining == 0 {
            self.attempts.remove_if(key, |_, attempts| attempts.is_empty());
        }
        remaining
    }

    fn try_reserve(&self, key: &str, at: DateTime<Utc>, since: DateTime<Utc>, max: usize) -> bool {
        let mut entry = self.attempts.entry(key.to_string()).or_default();
        entry.retain(|t| *t > since);
        if entry.len() >= max {
            return false;
        }
        entry.push(at);
        true
    }

    fn release(&self, key: &str, at: DateTime<Utc>) {
        let emptied = match self.attempts.get_mut(key) {
            Some(mut entry) => {
                if let Some(pos) = entry.iter().rposition(|t| *t == at) {
                    entry.swap_remove(pos);
                }
                entry.is_empty()
            }
            None => false,
        };
        if emptied {
            self.attempts.remove_if(key, |_, attempts| attempts.is_empty());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
        }
    }
}

/// A reserved slot in the window; counts as a failure unless released
#[must_use = "an attempt that is never released counts as a failure"]
#[derive(Debug)]
pub struct Attempt {
    at: DateTime<Utc>,
}

pub struct RateLimiter<S: AttemptStore> {
    store: S,
    config: RateLimitConfig,
    clock: SharedClock,
}

impl<S: AttemptStore> RateLimiter<S> {
    pub fn new(store: S, config: RateLimitConfig, clock: SharedClock) -> Self {
        Self { store, config, clock }
    }

    /// Reserve an attempt for `source`, failing once the window is full
    pub fn begin(&self, source: &str) -> HealthResult<Attempt> {
        let now = self.clock.now();
        let since = now - self.config.window;
        if !self
            .store
            .try_reserve(source, now, since, self.config.max_attempts)
        {
            tracing::warn!(source, max_attempts = self.config.max_attempts, "login rate limit exceeded");
            return Err(HealthError::RateLimited(format!(
                "Too many failed attempts. Try again in {} minutes",
                self.config.window.num_minutes()
            )));
        }
        Ok(Attempt { at: now })
    }

    /// The credentials were correct; the attempt no longer counts
    pub fn release(&self, source: &str, attempt: Attempt) {
        self.store.release(source, attempt.at);
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
