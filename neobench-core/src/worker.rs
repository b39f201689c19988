use std::sync::Arc;
use std::time::Duration;

use neobench_script::UnitOfWork;

use crate::clock::Clock;
use crate::driver::{Driver, Session};
use crate::recorder::{ResultRecorder, UowOutcome, WorkerResult};
use crate::stop::StopSignal;
use crate::workload::ClientWorkload;

/// Converts a total target rate into the per-client pacing interval used
/// to slow workers down to match it.
#[must_use]
pub fn per_client_pacing(num_clients: usize, rate_per_second: f64) -> Duration {
    let per_worker = rate_per_second / num_clients as f64;
    Duration::from_micros((1_000_000.0 / per_worker) as u64)
}

/// One benchmark client. The clock is an explicit dependency so pacing can
/// be tested on virtual time.
pub struct Worker {
    worker_id: i64,
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
}

impl Worker {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, clock: Arc<dyn Clock>, worker_id: i64) -> Self {
        Worker {
            worker_id,
            driver,
            clock,
        }
    }

    /// Run units of work until the stop signal is raised or
    /// `max_transactions` is reached (0 means unbounded).
    ///
    /// `transaction_rate` is the time between transaction starts and
    /// defines the offered load; zero means go as fast as possible
    /// (throughput mode, where the recorded latencies are uninformative).
    pub fn run_benchmark(
        &self,
        mut workload: ClientWorkload,
        database: &str,
        transaction_rate: Duration,
        max_transactions: u64,
        stop: &StopSignal,
        recorder: &ResultRecorder,
    ) -> WorkerResult {
        let mut session = match self.driver.session(database) {
            Ok(session) => session,
            Err(err) => return WorkerResult::crashed(self.worker_id, err.into()),
        };

        let start = self.clock.now();
        recorder.start_at(start);

        let mut next_start = start;
        let mut transactions: u64 = 0;

        loop {
            if stop.is_stopped() {
                return recorder.complete(self.clock.now());
            }

            let unit = match workload.next(self.worker_id) {
                Ok(unit) => unit,
                Err(err) => return WorkerResult::crashed(self.worker_id, err.into()),
            };

            let outcome = run_unit(session.as_mut(), &unit);

            let latency = self.clock.now().saturating_sub(next_start);

            if let Err(err) = recorder.record(&unit.script_name, latency, &outcome) {
                return WorkerResult::crashed(self.worker_id, err.into());
            }

            transactions += 1;
            if max_transactions != 0 && transactions >= max_transactions {
                return recorder.complete(self.clock.now());
            }

            if transaction_rate > Duration::ZERO {
                // Coordinated-omission correction: the schedule advances
                // by the rate, never by the time the unit actually took.
                // When the database can't keep up, next_start drifts
                // behind the wall clock and latencies measure from when
                // the request *should* have started, which is the wait a
                // real user arriving at this rate would see.
                if latency < transaction_rate {
                    self.clock.sleep(transaction_rate - latency);
                }
                next_start += transaction_rate;
            } else {
                // Throughput mode: coordinate with the database instead,
                // measuring how fast it can absorb units.
                next_start = self.clock.now();
            }
        }
    }
}

fn run_unit(session: &mut dyn Session, unit: &UnitOfWork) -> UowOutcome {
    match session.execute(unit) {
        Ok(()) => UowOutcome::success(),
        Err(err) => UowOutcome::failure(err),
    }
}
