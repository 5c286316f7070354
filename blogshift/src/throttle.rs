//! Fixed courtesy delays between network operations, over a pluggable clock.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Monotonic time source. `now` is measured from an arbitrary fixed origin.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by tokio timers.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for tests: sleeping advances time instantly and is recorded.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

/// Enforces a minimum interval between consecutive `wait` calls. The first call never waits.
pub struct Throttle {
    clock: Arc<dyn Clock>,
    interval: Duration,
    last: Option<Duration>,
}

impl Throttle {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep as long as needed to keep `interval` since the previous call. Returns the time slept.
    pub async fn wait(&mut self) -> Duration {
        let now = self.clock.now();
        let slept = match self.last {
            Some(last) => {
                let elapsed = now.saturating_sub(last);
                let remaining = self.interval.saturating_sub(elapsed);
                if !remaining.is_zero() {
                    debug!("throttle: sleeping {:?}", remaining);
                    self.clock.sleep(remaining).await;
                }
                remaining
            }
            None => Duration::ZERO,
        };
        self.last = Some(self.clock.now());
        slept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_wait_is_free_then_interval_is_enforced() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = Throttle::new(clock.clone(), Duration::from_secs(5));

        assert_eq!(throttle.wait().await, Duration::ZERO);
        assert_eq!(throttle.wait().await, Duration::from_secs(5));

        // Work that already took long enough needs no extra pause
        clock.advance(Duration::from_secs(7));
        assert_eq!(throttle.wait().await, Duration::ZERO);

        clock.advance(Duration::from_secs(2));
        assert_eq!(throttle.wait().await, Duration::from_secs(3));

        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(3)]
        );
        assert_eq!(clock.total_slept(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn zero_interval_never_sleeps() {
        let clock = Arc::new(ManualClock::new());
        let mut throttle = Throttle::new(clock.clone(), Duration::ZERO);
        for _ in 0..3 {
            throttle.wait().await;
        }
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_sleeps_for_real() {
        let clock = TokioClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(250)).await;
        assert!(clock.now() - before >= Duration::from_millis(250));
    }
}
