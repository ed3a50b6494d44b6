//! Rate limiting module
//!
//! A fixed-window governor in front of the generation service. The window
//! state is owned by the conversation loop and mutated only from there; the
//! limiter never blocks, it only answers whether the next request may go out.
//! Pausing after a denial is the caller's job, using [`RateLimiter::cooldown`].
//!
//! # Window semantics
//!
//! - The counter resets only once the time since `window_start` is strictly
//!   greater than the window length.
//! - Within a window the counter only grows and never exceeds `capacity`.
//! - Denied calls are not counted.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;

/// Counter for the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub request_count: u32,
    pub window_start: Instant,
}

/// Fixed-window rate limiter for generation requests
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    cooldown: Duration,
    state: RateWindow,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the wall clock
    pub fn new(capacity: u32, window: Duration, cooldown: Duration) -> Self {
        Self::with_clock(capacity, window, cooldown, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`
    pub fn with_clock(
        capacity: u32,
        window: Duration,
        cooldown: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window_start = clock.now();
        Self {
            capacity,
            window,
            cooldown,
            state: RateWindow {
                request_count: 0,
                window_start,
            },
            clock,
        }
    }

    /// Build from the `[rate_limit]` config section
    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(config.capacity, config.window(), config.cooldown(), clock)
    }

    /// Ask to send one generation request
    ///
    /// Call once per turn, not once per retry.
    pub fn allow(&mut self) -> bool {
        let now = self.clock.now();

        if now.saturating_duration_since(self.state.window_start) > self.window {
            debug!(
                "Rate window elapsed after {} requests, resetting",
                self.state.request_count
            );
            self.state = RateWindow {
                request_count: 0,
                window_start: now,
            };
        }

        if self.state.request_count < self.capacity {
            self.state.request_count += 1;
            debug!(
                "Rate limit check: {}/{} requests in window",
                self.state.request_count, self.capacity
            );
            true
        } else {
            warn!(
                "Rate limit exceeded: {}/{} requests in {:?} window",
                self.state.request_count, self.capacity, self.window
            );
            false
        }
    }

    /// Requests still available in the current window
    ///
    /// Does not account for a window that has elapsed but not yet been reset
    /// by a call to [`allow`](Self::allow).
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.state.request_count)
    }

    /// How long the caller should pause after a denial
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Snapshot of the current window
    pub fn state(&self) -> RateWindow {
        self.state
    }
}
