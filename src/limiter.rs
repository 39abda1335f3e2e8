// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window request counter keyed by client.
//!
//! Each [`ClientKey`] owns a `(count, window_start)` pair. Admission resets
//! the pair once the window has elapsed, then increments while the count is
//! below the quota. The per-key update runs under the map shard lock, so two
//! concurrent admits for the same key can never both take the last slot.

use crate::config::RateLimitConfig;
use crate::request::ClientKey;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of [`WindowCounter::admit`].
#[derive(Debug, Clone)]
pub enum Admission {
    /// Request counted against the quota
    Allowed {
        /// Handle used to give the slot back on a failed response
        ticket: AdmissionTicket,
        /// Remaining requests in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Quota exhausted for this window
    Denied {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Identifies one counted request so it can be released later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionTicket {
    key: ClientKey,
    window_start: Instant,
}

impl AdmissionTicket {
    pub fn key(&self) -> &ClientKey {
        &self.key
    }
}

/// Counter state for a single client.
#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

impl WindowState {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        if now.duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn reset_in(&self, now: Instant, window: Duration) -> Duration {
        window.saturating_sub(now.duration_since(self.window_start))
    }
}

/// Thread-safe fixed-window counter for one route group.
pub struct WindowCounter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<ClientKey, WindowState>,
}

impl WindowCounter {
    /// Create a new counter with the given quota.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window_duration(),
            windows: DashMap::new(),
        }
    }

    /// Count a request for `key` if its window still has room.
    pub fn admit(&self, key: &ClientKey) -> Admission {
        let now = Instant::now();
        let mut state = self
            .windows
            .entry(key.clone())
            .or_insert_with(|| WindowState::new(now));

        state.roll(now, self.window);

        if state.count < self.max_requests {
            state.count += 1;
            Admission::Allowed {
                ticket: AdmissionTicket {
                    key: key.clone(),
                    window_start: state.window_start,
                },
                remaining: self.max_requests - state.count,
                reset_in: state.reset_in(now, self.window),
            }
        } else {
            let retry_after = state.reset_in(now, self.window);
            debug!(%key, ?retry_after, "Window quota exhausted");
            Admission::Denied { retry_after }
        }
    }

    /// Give back a slot taken by [`admit`](Self::admit).
    ///
    /// No-op once the ticket's window has been replaced. Returns whether a
    /// slot was released.
    pub fn release(&self, ticket: &AdmissionTicket) -> bool {
        match self.windows.get_mut(&ticket.key) {
            Some(mut state) if state.window_start == ticket.window_start && state.count > 0 => {
                state.count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Requests counted for `key` in its current window.
    pub fn current_count(&self, key: &ClientKey) -> u32 {
        let now = Instant::now();
        self.windows
            .get(key)
            .filter(|state| now.duration_since(state.window_start) < self.window)
            .map_or(0, |state| state.count)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Number of clients with tracked state.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Drop clients whose window ended more than one window ago.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let stale_after = self.window * 2;
        let before = self.windows.len();
        self.windows
            .retain(|_, state| now.duration_since(state.window_start) < stale_after);
        debug!(
            evicted = before.saturating_sub(self.windows.len()),
            "Window counter cleanup"
        );
    }
}
