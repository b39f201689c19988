use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;

use neobench_script::EvalError;

use crate::driver::DriverError;

/// Latencies are recorded in microseconds, up to one hour.
pub(crate) fn new_latency_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, 60 * 60 * 1_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Outcome of one unit of work.
#[derive(Debug)]
pub struct UowOutcome {
    pub succeeded: bool,
    /// Opaque grouping key for failures; counts are kept per unique key.
    pub failure_group: String,
    pub error: Option<DriverError>,
}

impl UowOutcome {
    #[must_use]
    pub fn success() -> Self {
        UowOutcome {
            succeeded: true,
            failure_group: String::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: DriverError) -> Self {
        UowOutcome {
            succeeded: false,
            failure_group: error.group(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to record latency {latency:?}: {message}")]
pub struct RecorderError {
    pub latency: Duration,
    pub message: String,
}

/// A fatal cause that made a worker exit early.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Count with the first error seen for one failure group.
#[derive(Debug, Clone)]
pub struct FailureGroup {
    pub count: i64,
    pub first_error: String,
}

/// Results for one script: counts, rate, and the latency histogram.
/// The histogram only ever records successful units, so its total count
/// equals `succeeded`.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    pub script_name: String,
    /// Units per second, succeeded and failed together.
    pub rate: f64,
    pub succeeded: i64,
    pub failed: i64,
    pub latencies: Histogram<u64>,
}

impl ScriptResult {
    fn new(script_name: &str) -> Self {
        ScriptResult {
            script_name: script_name.to_string(),
            rate: 0.0,
            succeeded: 0,
            failed: 0,
            latencies: new_latency_histogram(),
        }
    }

    pub fn merge_from(&mut self, other: &ScriptResult) {
        self.rate += other.rate;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        if let Err(err) = self.latencies.add(&other.latencies) {
            // Both sides share the same bounds, so this cannot trigger.
            panic!("failed to merge latency histograms: {err}");
        }
    }
}

/// One worker's statistics.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker_id: i64,
    /// Set when the worker crashed and exited early; the statistics then
    /// cover only what ran before the crash.
    pub error: Option<WorkerError>,
    pub scripts: AHashMap<String, ScriptResult>,
    pub failed_by_group: AHashMap<String, FailureGroup>,
}

impl WorkerResult {
    #[must_use]
    pub fn new(worker_id: i64) -> Self {
        WorkerResult {
            worker_id,
            error: None,
            scripts: AHashMap::new(),
            failed_by_group: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn crashed(worker_id: i64, error: WorkerError) -> Self {
        let mut result = WorkerResult::new(worker_id);
        result.error = Some(error);
        result
    }

    fn record(
        &mut self,
        script_name: &str,
        latency: Duration,
        outcome: &UowOutcome,
    ) -> Result<(), RecorderError> {
        let stats = self
            .scripts
            .entry(script_name.to_string())
            .or_insert_with(|| ScriptResult::new(script_name));

        if outcome.succeeded {
            stats.succeeded += 1;
            stats
                .latencies
                .record(latency.as_micros() as u64)
                .map_err(|err| RecorderError {
                    latency,
                    message: err.to_string(),
                })?;
        } else {
            stats.failed += 1;
            self.failed_by_group
                .entry(outcome.failure_group.clone())
                .and_modify(|group| group.count += 1)
                .or_insert_with(|| FailureGroup {
                    count: 1,
                    first_error: outcome
                        .error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                });
        }
        Ok(())
    }

    fn calculate_rate(&mut self, delta: Duration) {
        let seconds = delta.as_secs_f64().max(1e-9);
        for stats in self.scripts.values_mut() {
            stats.rate = (stats.succeeded + stats.failed) as f64 / seconds;
        }
    }
}

/// Concurrent structure the worker records into; other threads read
/// progress checkpoints from it.
///
/// Holds two accumulators: `current`, drained by each progress report, and
/// `total`, drained by `complete`. A record updates both under the same
/// lock, so draining one can never lose a sample from the other.
pub struct ResultRecorder {
    inner: Mutex<RecorderInner>,
}

struct RecorderInner {
    current: WorkerResult,
    current_start: Duration,
    total: WorkerResult,
    total_start: Duration,
}

impl ResultRecorder {
    #[must_use]
    pub fn new(worker_id: i64) -> Self {
        ResultRecorder {
            inner: Mutex::new(RecorderInner {
                current: WorkerResult::new(worker_id),
                current_start: Duration::ZERO,
                total: WorkerResult::new(worker_id),
                total_start: Duration::ZERO,
            }),
        }
    }

    /// Anchor both accumulators at the moment the workload starts.
    pub fn start_at(&self, now: Duration) {
        let mut inner = self.inner.lock();
        inner.current_start = now;
        inner.total_start = now;
    }

    pub fn record(
        &self,
        script_name: &str,
        latency: Duration,
        outcome: &UowOutcome,
    ) -> Result<(), RecorderError> {
        let mut inner = self.inner.lock();
        inner.current.record(script_name, latency, outcome)?;
        inner.total.record(script_name, latency, outcome)
    }

    /// Snapshot and reset the stats accumulated since the last report.
    pub fn progress_report(&self, now: Duration) -> WorkerResult {
        let mut inner = self.inner.lock();
        let worker_id = inner.current.worker_id;
        let mut out = std::mem::replace(&mut inner.current, WorkerResult::new(worker_id));
        out.calculate_rate(now.saturating_sub(inner.current_start));
        inner.current_start = now;
        out
    }

    /// Snapshot and reset the stats for the whole run.
    pub fn complete(&self, now: Duration) -> WorkerResult {
        let mut inner = self.inner.lock();
        let worker_id = inner.total.worker_id;
        let mut out = std::mem::replace(&mut inner.total, WorkerResult::new(worker_id));
        out.calculate_rate(now.saturating_sub(inner.total_start));
        inner.total_start = now;
        out
    }
}

/// Aggregated result of a run, merged across workers.
#[derive(Debug)]
pub struct RunResult {
    pub database_name: String,
    pub scenario: String,
    pub scripts: Vec<ScriptResult>,
    pub failed_by_group: AHashMap<String, FailureGroup>,
    /// Workers that crashed, with their fatal cause.
    pub worker_errors: Vec<(i64, WorkerError)>,
}

impl RunResult {
    /// Merge per-worker results: sum counts and rates per script, merge
    /// histograms, merge failure groups keeping the earliest first-error.
    /// Crashed workers contribute their error instead of statistics.
    #[must_use]
    pub fn merge(database_name: &str, scenario: &str, workers: Vec<WorkerResult>) -> Self {
        let mut scripts: BTreeMap<String, ScriptResult> = BTreeMap::new();
        let mut failed_by_group: AHashMap<String, FailureGroup> = AHashMap::new();
        let mut worker_errors = Vec::new();

        for worker in workers {
            if let Some(error) = worker.error {
                worker_errors.push((worker.worker_id, error));
                continue;
            }
            for (name, result) in worker.scripts {
                match scripts.entry(name) {
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert(result);
                    }
                    std::collections::btree_map::Entry::Occupied(mut slot) => {
                        slot.get_mut().merge_from(&result);
                    }
                }
            }
            for (group, failures) in worker.failed_by_group {
                failed_by_group
                    .entry(group)
                    .and_modify(|existing| existing.count += failures.count)
                    .or_insert(failures);
            }
        }

        RunResult {
            database_name: database_name.to_string(),
            scenario: scenario.to_string(),
            scripts: scripts.into_values().collect(),
            failed_by_group,
            worker_errors,
        }
    }

    #[must_use]
    pub fn total_succeeded(&self) -> i64 {
        self.scripts.iter().map(|s| s.succeeded).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> i64 {
        self.scripts.iter().map(|s| s.failed).sum()
    }

    #[must_use]
    pub fn total_rate(&self) -> f64 {
        self.scripts.iter().map(|s| s.rate).sum()
    }
}
