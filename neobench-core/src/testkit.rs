//! Fakes for exercising the engine without a database: a virtual clock
//! that advances only when slept on, and a scripted driver with
//! configurable failure rate and latency band.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use neobench_script::{dist, Statement, UnitOfWork};

use crate::clock::Clock;
use crate::driver::{Driver, DriverError, Session, StatementKind};

/// A clock that only moves when something sleeps on it.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Mutex<Duration>,
}

impl VirtualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock() += duration;
    }
}

/// Driver whose transactions take an exponentially distributed amount of
/// (clock) time and fail at a fixed rate. With a zero latency band it
/// completes instantly, which is handy for throughput tests on the real
/// clock.
pub struct FakeDriver {
    pub clock: Arc<dyn Clock>,
    pub seed: u64,
    pub failure_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl FakeDriver {
    #[must_use]
    pub fn instant(clock: Arc<dyn Clock>) -> Self {
        FakeDriver {
            clock,
            seed: 1337,
            failure_rate: 0.0,
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
        }
    }
}

impl Driver for FakeDriver {
    fn session(&self, _database: &str) -> Result<Box<dyn Session>, DriverError> {
        Ok(Box::new(FakeSession {
            clock: self.clock.clone(),
            rng: StdRng::seed_from_u64(self.seed),
            failure_rate: self.failure_rate,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
        }))
    }
}

struct FakeSession {
    clock: Arc<dyn Clock>,
    rng: StdRng,
    failure_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl Session for FakeSession {
    fn execute(&mut self, _unit: &UnitOfWork) -> Result<(), DriverError> {
        if self.failure_rate > 0.0 && self.rng.gen::<f64>() <= self.failure_rate {
            return Err(DriverError::Database(
                "induced error from test harness".to_string(),
            ));
        }
        if self.max_latency > self.min_latency {
            let millis = dist::exponential(
                &mut self.rng,
                self.min_latency.as_millis() as i64,
                self.max_latency.as_millis() as i64,
                0.5,
            )
            .expect("valid exponential parameter");
            self.clock.sleep(Duration::from_millis(millis.max(0) as u64));
        } else if self.min_latency > Duration::ZERO {
            self.clock.sleep(self.min_latency);
        }
        Ok(())
    }

    fn explain(&mut self, statement: &Statement) -> Result<StatementKind, DriverError> {
        let upper = statement.query.to_uppercase();
        let writes = ["CREATE", "MERGE", "DELETE", "SET ", "REMOVE"]
            .iter()
            .any(|kw| upper.contains(kw));
        Ok(if writes {
            StatementKind::ReadWrite
        } else {
            StatementKind::ReadOnly
        })
    }
}

/// Driver that refuses to open sessions; for exercising crash paths.
pub struct RefusingDriver;

impl Driver for RefusingDriver {
    fn session(&self, _database: &str) -> Result<Box<dyn Session>, DriverError> {
        Err(DriverError::Session("connection refused".to_string()))
    }
}
