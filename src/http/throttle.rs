//! Per-host backoff clock shared across connections.
//!
//! Populated from `Retry-After` on 4xx/5xx responses and consulted before
//! every send. Deadlines only ever move forward; stale entries evaluate to
//! zero remaining wait and are evicted lazily on update.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct RequestThrottler {
    backoff: DashMap<String, Instant>,
}

impl RequestThrottler {
    pub fn new() -> Self {
        Self {
            backoff: DashMap::new(),
        }
    }

    /// Forbid sends to `host` until `until`. An earlier deadline than the
    /// one already recorded is ignored.
    pub fn throttle(&self, host: &str, until: Instant) {
        if host.is_empty() {
            return;
        }

        let now = Instant::now();
        self.backoff.retain(|h, deadline| h == host || *deadline > now);

        self.backoff
            .entry(host.to_string())
            .and_modify(|deadline| {
                if *deadline < until {
                    *deadline = until;
                }
            })
            .or_insert(until);
    }

    /// Remaining wait before `host` may be sent to. Zero if never throttled
    /// or if the deadline has passed.
    pub fn get_throttle(&self, host: &str) -> Duration {
        self.backoff
            .get(host)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Number of hosts with a recorded deadline, including expired ones not
    /// yet evicted.
    pub fn len(&self) -> usize {
        self.backoff.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backoff.is_empty()
    }
}
