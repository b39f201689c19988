use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use neobench_core::{
    preflight, run_benchmark, BenchmarkConfig, Clock, Driver, ProgressFn, Scripts, StopSignal,
    SystemClock, Workload,
};
use neobench_script::{parse, CsvLoader, Script, Vars};
use neobench_value::Value;

use crate::bolt::{BoltDriver, ConnectOptions, EncryptionMode};
use crate::cli::{Cli, EncryptionArg, WorkloadSpec};
use crate::exit_codes::ExitCode;
use crate::output::{self, Output};
use crate::run_error::RunError;
use crate::builtin;

pub fn run(cli: Cli) -> Result<ExitCode, RunError> {
    let out: Arc<dyn Output> = output::formatter(cli.output).into();

    if cli.clients < 1 {
        return Err(RunError::InvalidInput(anyhow!(
            "--clients must be at least 1"
        )));
    }
    if cli.latency && cli.rate <= 0.0 {
        return Err(RunError::InvalidInput(anyhow!(
            "--rate must be positive in latency mode"
        )));
    }
    let specs = cli
        .workloads()
        .map_err(|message| RunError::InvalidInput(anyhow!(message)))?;

    let mut variables = Vars::default();
    variables.insert("scale".to_string(), Value::Int(cli.scale));
    for define in &cli.define {
        variables.insert(define.name.clone(), define.value.clone());
    }

    let database = cli.database.clone().unwrap_or_default();
    let driver = BoltDriver::connect(&ConnectOptions {
        address: &cli.address,
        user: &cli.user,
        password: &cli.password,
        database: &database,
        encryption: match cli.encryption {
            EncryptionArg::Auto => EncryptionMode::Auto,
            EncryptionArg::True => EncryptionMode::On,
            EncryptionArg::False => EncryptionMode::Off,
        },
        check_certificates: !cli.no_check_certificates,
    })
    .map_err(RunError::Runtime)?;

    if cli.init {
        let mut initialised = Vec::new();
        for spec in &specs {
            if let WorkloadSpec::Builtin { name, .. } = spec {
                if initialised.contains(name) {
                    continue;
                }
                builtin::init(name, cli.scale, &driver, out.as_ref())
                    .map_err(RunError::Runtime)?;
                initialised.push(name.clone());
            }
        }
    }

    if cli.duration.is_zero() {
        return Ok(ExitCode::Success);
    }

    let csv = Arc::new(CsvLoader::new());
    let scripts = assemble_scripts(&specs, &driver, &database, &variables, &csv)?;

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut workload = Workload::new(variables, Scripts::new(scripts), csv, seed);

    let stop = StopSignal::new();
    for signal in [SIGINT, SIGTERM] {
        // Second signal force-exits; the first one only raises the flag.
        flag::register_conditional_shutdown(signal, ExitCode::RuntimeError.as_i32(), stop.flag())
            .and_then(|_| flag::register(signal, stop.flag()))
            .map_err(|e| RunError::Runtime(anyhow!("failed to install signal handler: {e}")))?;
    }

    let cfg = BenchmarkConfig {
        database,
        scenario: cli.describe_scenario(),
        clients: cli.clients,
        duration: cli.duration,
        latency_mode: cli.latency,
        rate: cli.rate,
        progress_interval: cli.progress,
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let driver: Arc<dyn Driver> = Arc::new(driver);

    let progress_out = out.clone();
    let progress: ProgressFn = Arc::new(move |update| progress_out.report_progress(&update));

    let result = run_benchmark(driver, clock, &mut workload, &cfg, stop, Some(progress))
        .map_err(|e| RunError::Runtime(e.into()))?;

    for (worker_id, error) in &result.worker_errors {
        out.error(&format!("worker {worker_id} crashed: {error}"));
    }

    if cli.latency {
        out.report_latency(&result);
    } else {
        out.report_throughput(&result);
    }

    if result.total_failed() > 0 || !result.worker_errors.is_empty() {
        Ok(ExitCode::RuntimeError)
    } else {
        Ok(ExitCode::Success)
    }
}

/// Parse every requested workload and preflight it, classifying each
/// script as read-only or writing.
fn assemble_scripts(
    specs: &[WorkloadSpec],
    driver: &BoltDriver,
    database: &str,
    variables: &Vars,
    csv: &CsvLoader,
) -> Result<Vec<Script>, RunError> {
    let mut session = driver
        .session(database)
        .map_err(|e| RunError::Runtime(anyhow!(e)))?;

    let mut scripts = Vec::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        let (name, text, weight) = match spec {
            WorkloadSpec::Builtin { name, weight } => {
                let text = builtin::source(name).ok_or_else(|| {
                    RunError::InvalidInput(anyhow!(
                        "unknown builtin workload '{name}' (available: tpcb-like, match-only)"
                    ))
                })?;
                (format!("builtin:{name}"), text.to_string(), *weight)
            }
            WorkloadSpec::File { path, weight } => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    RunError::Runtime(anyhow!("failed to read workload file at {path}: {e}"))
                })?;
                (path.clone(), text, *weight)
            }
            WorkloadSpec::Inline { text, weight } => {
                (format!("script:{index}"), text.clone(), *weight)
            }
        };

        let mut script =
            parse(&name, &text, weight).map_err(|e| RunError::Runtime(anyhow!(e)))?;
        script.readonly = preflight(session.as_mut(), &script, variables, csv)
            .map_err(|e| RunError::Runtime(anyhow!(e)))?;
        tracing::debug!(script = %script.name, readonly = script.readonly, "preflight passed");
        scripts.push(script);
    }
    Ok(scripts)
}
