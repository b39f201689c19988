use std::time::{Duration, Instant};

/// Time as the worker loop sees it: an offset since the clock's origin,
/// and a way to wait. Workers take this as an explicit dependency so tests
/// can run the pacing logic on virtual time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Monotonic wall-clock time.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if duration > Duration::ZERO {
            std::thread::sleep(duration);
        }
    }
}
