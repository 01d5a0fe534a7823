use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source for latency, throughput and scroll timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-advanced clock for deterministic tests and offline replay.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.current.lock() {
            *now += by;
        }
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs.max(0.0)));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        match self.current.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
