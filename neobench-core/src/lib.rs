//! The neobench workload engine: per-client worker loops with
//! coordinated-omission-corrected pacing, weighted script selection,
//! concurrent result recording, preflight validation, and the coordinator
//! that ties a run together.
//!
//! The database itself sits behind the [`Driver`]/[`Session`] traits;
//! everything here runs against any implementation of those, including
//! the fakes in [`testkit`].

mod clock;
mod driver;
mod preflight;
mod recorder;
mod run;
mod stop;
mod worker;
mod workload;

pub mod testkit;

pub use clock::{Clock, SystemClock};
pub use driver::{Driver, DriverError, Session, StatementKind};
pub use preflight::{preflight, PreflightError};
pub use recorder::{
    FailureGroup, RecorderError, ResultRecorder, RunResult, ScriptResult, UowOutcome,
    WorkerError, WorkerResult,
};
pub use run::{run_benchmark, BenchmarkConfig, CoreError, ProgressFn, ProgressUpdate};
pub use stop::StopSignal;
pub use worker::{per_client_pacing, Worker};
pub use workload::{client_vars, ClientWorkload, Scripts, WeightedRandom, Workload};
