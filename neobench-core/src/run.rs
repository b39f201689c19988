use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crate::clock::Clock;
use crate::driver::Driver;
use crate::recorder::{ResultRecorder, RunResult, WorkerResult};
use crate::stop::StopSignal;
use crate::worker::{per_client_pacing, Worker};
use crate::workload::Workload;

#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Target database; empty means the server default.
    pub database: String,
    /// Human-readable reconstruction of the requested scenario, carried
    /// into reports.
    pub scenario: String,
    pub clients: usize,
    pub duration: Duration,
    /// When set, pace transactions to `rate` per second across all
    /// clients and measure latency; otherwise run at full throughput.
    pub latency_mode: bool,
    pub rate: f64,
    /// How often progress checkpoints are taken; zero disables them.
    pub progress_interval: Duration,
}

/// A progress checkpoint: everything recorded since the previous one.
pub struct ProgressUpdate {
    pub elapsed: Duration,
    pub completeness: f64,
    pub checkpoint: RunResult,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("all workers failed")]
    AllWorkersFailed,
}

/// Spawn one worker per client, arm the deadline, poll checkpoints, and
/// aggregate everything when the workers come back.
///
/// A crashed worker is surfaced through `RunResult::worker_errors` and the
/// run keeps going with the survivors; only a run with no survivors at
/// all is an error.
pub fn run_benchmark(
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
    workload: &mut Workload,
    cfg: &BenchmarkConfig,
    stop: StopSignal,
    progress: Option<ProgressFn>,
) -> Result<RunResult, CoreError> {
    let transaction_rate = if cfg.latency_mode {
        per_client_pacing(cfg.clients, cfg.rate)
    } else {
        Duration::ZERO
    };

    let recorders: Vec<Arc<ResultRecorder>> = (0..cfg.clients)
        .map(|id| Arc::new(ResultRecorder::new(id as i64)))
        .collect();
    let finished = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = mpsc::channel::<WorkerResult>();

    std::thread::scope(|scope| {
        for (id, recorder) in recorders.iter().enumerate() {
            let worker = Worker::new(driver.clone(), clock.clone(), id as i64);
            let client = workload.new_client();
            let database = cfg.database.clone();
            let stop = stop.clone();
            let sender = sender.clone();
            let finished = finished.clone();
            let recorder = recorder.clone();
            scope.spawn(move || {
                let result =
                    worker.run_benchmark(client, &database, transaction_rate, 0, &stop, &recorder);
                finished.fetch_add(1, Ordering::SeqCst);
                let _ = sender.send(result);
            });
        }

        // The coordinating thread doubles as deadline timer and
        // checkpoint poller.
        let started = clock.now();
        let deadline = started + cfg.duration;
        let mut last_checkpoint = started;
        loop {
            if stop.is_stopped() || finished.load(Ordering::SeqCst) >= cfg.clients {
                break;
            }
            let now = clock.now();
            if now >= deadline {
                break;
            }
            if let Some(progress) = &progress {
                if cfg.progress_interval > Duration::ZERO
                    && now.saturating_sub(last_checkpoint) >= cfg.progress_interval
                {
                    last_checkpoint = now;
                    let workers: Vec<WorkerResult> = recorders
                        .iter()
                        .map(|recorder| recorder.progress_report(now))
                        .collect();
                    let elapsed = now.saturating_sub(started);
                    let completeness =
                        (elapsed.as_secs_f64() / cfg.duration.as_secs_f64().max(1e-9)).min(1.0);
                    (progress.as_ref())(ProgressUpdate {
                        elapsed,
                        completeness,
                        checkpoint: RunResult::merge(&cfg.database, &cfg.scenario, workers),
                    });
                }
            }
            let remaining = deadline.saturating_sub(clock.now());
            clock.sleep(remaining.min(Duration::from_millis(100)));
        }
        stop.stop();
    });
    drop(sender);

    let results: Vec<WorkerResult> = receiver.iter().collect();
    let merged = RunResult::merge(&cfg.database, &cfg.scenario, results);
    if merged.scripts.is_empty() && !merged.worker_errors.is_empty() {
        return Err(CoreError::AllWorkersFailed);
    }
    Ok(merged)
}
