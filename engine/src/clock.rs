//! Time sources for the turn pipeline
//!
//! The rate limiter reads the time through [`Clock`] and every pause in the
//! pipeline goes through [`Sleeper`], so tests drive both with a
//! [`ManualClock`] instead of waiting on the wall clock.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Something that can pause the current task
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

/// Clock and sleeper that only move when told to
///
/// Sleeping advances the clock by the requested duration and records it, so
/// a test can assert both how often and how long the pipeline paused.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    /// Every duration passed to `sleep`, in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        // A panicking test thread must not hide the recorded state from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }
}

#[async_trait]
impl Sleeper for ManualClock {
    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(61));

        assert_eq!(clock.now() - start, Duration::from_secs(61));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_manual_sleep_records_and_advances() {
        let clock = ManualClock::new();
        let shared = clock.clone();

        shared.sleep(Duration::from_secs(2)).await;
        shared.sleep(Duration::from_secs(5)).await;

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(5)]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_tokio_sleeper_zero_duration() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}
