use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use neobench_core::testkit::{FakeDriver, RefusingDriver, VirtualClock};
use neobench_core::{
    per_client_pacing, preflight, run_benchmark, BenchmarkConfig, CoreError, ResultRecorder,
    Scripts, StopSignal, SystemClock, UowOutcome, Worker, Workload,
};
use neobench_script::{parse, CsvLoader, Script, Vars};

fn single_script_workload(name: &str, source: &str, seed: u64) -> Workload {
    let script = parse(name, source, 1.0).expect("script parses");
    Workload::new(
        Vars::default(),
        Scripts::new(vec![script]),
        Arc::new(CsvLoader::new()),
        seed,
    )
}

/// The coordinated-omission correction: with 20% failures and latencies
/// up to twice the pacing interval, the observed rate still converges on
/// the configured one.
#[test]
fn pacing_maintains_rate_in_face_of_failure() {
    let clock = Arc::new(VirtualClock::new());
    let driver = Arc::new(FakeDriver {
        clock: clock.clone(),
        seed: 1337,
        failure_rate: 0.2,
        min_latency: Duration::from_millis(2),
        max_latency: Duration::from_millis(2000),
    });

    let target_rate_per_second = 1.0;
    let tx_duration = per_client_pacing(1, target_rate_per_second);

    let mut workload = single_script_workload("workertest", "RETURN 1;", 1337);
    let recorder = ResultRecorder::new(0);
    let stop = StopSignal::new();
    let worker = Worker::new(driver, clock, 0);

    let result = worker.run_benchmark(workload.new_client(), "", tx_duration, 100, &stop, &recorder);

    assert!(result.error.is_none(), "{:?}", result.error);
    let stats = &result.scripts["workertest"];
    assert_eq!(stats.succeeded + stats.failed, 100);
    assert!(
        (stats.rate - target_rate_per_second).abs() <= target_rate_per_second * 0.1,
        "rate {} drifted more than 10% from {}",
        stats.rate,
        target_rate_per_second
    );
}

#[test]
fn latencies_measure_from_the_scheduled_start() {
    let clock = Arc::new(VirtualClock::new());
    // Every transaction takes 3x the pacing interval, so the backlog grows
    // by 2 intervals per unit and recorded latency with it.
    let driver = Arc::new(FakeDriver {
        clock: clock.clone(),
        seed: 1,
        failure_rate: 0.0,
        min_latency: Duration::from_secs(3),
        max_latency: Duration::from_secs(3),
    });

    let mut workload = single_script_workload("slow", "RETURN 1;", 1);
    let recorder = ResultRecorder::new(0);
    let stop = StopSignal::new();
    let worker = Worker::new(driver, clock, 0);

    let result = worker.run_benchmark(
        workload.new_client(),
        "",
        Duration::from_secs(1),
        10,
        &stop,
        &recorder,
    );

    let stats = &result.scripts["slow"];
    // Last unit starts at 27s virtual, was scheduled for 9s: 21s latency.
    let max_micros = stats.latencies.max();
    assert!(
        max_micros >= Duration::from_secs(20).as_micros() as u64,
        "coordinated omission not corrected: max latency {max_micros}us"
    );
}

#[test]
fn weighted_selection_matches_weights_within_tolerance() {
    let a = Script {
        name: "a".to_string(),
        weight: 1.0,
        readonly: false,
        autocommit: false,
        commands: Vec::new(),
    };
    let mut b = a.clone();
    b.name = "b".to_string();
    b.weight = 2.5;
    let mut c = a.clone();
    c.name = "c".to_string();
    c.weight = 10.0;

    let scripts = Scripts::new(vec![a, b, c]);
    let mut rng = StdRng::seed_from_u64(1337);
    let mut counts = std::collections::HashMap::new();
    for _ in 0..1_000_000 {
        let chosen = scripts.choose(&mut rng);
        *counts.entry(chosen.name.clone()).or_insert(0u64) += 1;
    }

    let baseline = counts["a"] as f64;
    let b_norm = counts["b"] as f64 / baseline;
    let c_norm = counts["c"] as f64 / baseline;
    assert!((b_norm - 2.5).abs() <= 0.25, "b drew at {b_norm}, wanted 2.5");
    assert!((c_norm - 10.0).abs() <= 1.0, "c drew at {c_norm}, wanted 10.0");
}

#[test]
fn merge_is_order_independent_for_counts_and_histograms() {
    let make_worker = |id: i64| {
        let recorder = ResultRecorder::new(id);
        recorder.start_at(Duration::ZERO);
        for i in 0..50 {
            recorder
                .record(
                    "s",
                    Duration::from_millis((id as u64 + 1) * (i + 1)),
                    &UowOutcome::success(),
                )
                .unwrap();
        }
        recorder.complete(Duration::from_secs(10))
    };

    let forward = neobench_core::RunResult::merge(
        "db",
        "s",
        vec![make_worker(0), make_worker(1), make_worker(2), make_worker(3)],
    );
    let reverse = neobench_core::RunResult::merge(
        "db",
        "s",
        vec![make_worker(3), make_worker(2), make_worker(1), make_worker(0)],
    );

    assert_eq!(forward.total_succeeded(), reverse.total_succeeded());
    assert_eq!(forward.total_failed(), reverse.total_failed());
    let (f, r) = (&forward.scripts[0], &reverse.scripts[0]);
    assert_eq!(f.latencies.len(), r.latencies.len());
    for q in [0.0, 0.25, 0.5, 0.75, 0.99, 1.0] {
        assert_eq!(
            f.latencies.value_at_quantile(q),
            r.latencies.value_at_quantile(q),
            "quantile {q} differs"
        );
    }
}

#[test]
fn end_to_end_throughput_run() {
    let clock = Arc::new(SystemClock::new());
    let driver = Arc::new(FakeDriver::instant(clock.clone()));
    let mut workload = single_script_workload("e2e", "RETURN 1;", 1337);

    let updates = Arc::new(AtomicUsize::new(0));
    let updates_seen = updates.clone();
    let progress: neobench_core::ProgressFn = Arc::new(move |update| {
        assert!(update.completeness <= 1.0);
        updates_seen.fetch_add(1, Ordering::SeqCst);
    });

    let cfg = BenchmarkConfig {
        database: String::new(),
        scenario: "-w e2e -c 2".to_string(),
        clients: 2,
        duration: Duration::from_millis(300),
        latency_mode: false,
        rate: 0.0,
        progress_interval: Duration::from_millis(50),
    };

    let result = run_benchmark(
        driver,
        clock,
        &mut workload,
        &cfg,
        StopSignal::new(),
        Some(progress),
    )
    .expect("run succeeds");

    assert!(result.worker_errors.is_empty());
    assert_eq!(result.scripts.len(), 1);
    assert_eq!(result.scripts[0].script_name, "e2e");
    assert!(result.total_succeeded() > 0);
    assert_eq!(result.total_failed(), 0);
    assert!(updates.load(Ordering::SeqCst) >= 1, "no checkpoints seen");
}

#[test]
fn stop_signal_ends_the_run_early() {
    let clock = Arc::new(SystemClock::new());
    let driver = Arc::new(FakeDriver::instant(clock.clone()));
    let mut workload = single_script_workload("stopped", "RETURN 1;", 7);

    let stop = StopSignal::new();
    stop.stop();

    let cfg = BenchmarkConfig {
        database: String::new(),
        scenario: String::new(),
        clients: 1,
        duration: Duration::from_secs(3600),
        latency_mode: false,
        rate: 0.0,
        progress_interval: Duration::ZERO,
    };

    // Returns promptly despite the hour-long deadline.
    let result = run_benchmark(driver, clock, &mut workload, &cfg, stop, None).expect("run ends");
    assert_eq!(result.total_failed(), 0);
}

#[test]
fn all_workers_failing_is_an_error() {
    let clock = Arc::new(SystemClock::new());
    let mut workload = single_script_workload("crash", "RETURN 1;", 7);

    let cfg = BenchmarkConfig {
        database: String::new(),
        scenario: String::new(),
        clients: 2,
        duration: Duration::from_secs(1),
        latency_mode: false,
        rate: 0.0,
        progress_interval: Duration::ZERO,
    };

    let err = run_benchmark(
        Arc::new(RefusingDriver),
        clock,
        &mut workload,
        &cfg,
        StopSignal::new(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::AllWorkersFailed));
}

#[test]
fn preflight_classifies_and_suppresses_sleeps() {
    let clock = Arc::new(VirtualClock::new());
    let driver = FakeDriver::instant(clock);
    let mut session = neobench_core::Driver::session(&driver, "").unwrap();
    let csv = CsvLoader::new();

    let read_script = parse(
        "reads",
        ":sleep 3600\nMATCH (n) RETURN count(n);",
        1.0,
    )
    .unwrap();
    assert!(preflight(session.as_mut(), &read_script, &Vars::default(), &csv).unwrap());

    let write_script = parse("writes", "CREATE (n:Node);", 1.0).unwrap();
    assert!(!preflight(session.as_mut(), &write_script, &Vars::default(), &csv).unwrap());

    let broken = parse("broken", ":set x blorb(1)\nRETURN $x;", 1.0).unwrap();
    let err = preflight(session.as_mut(), &broken, &Vars::default(), &csv).unwrap_err();
    assert!(err.to_string().contains("broken"), "{err}");
    assert!(err.to_string().contains("unknown function"), "{err}");
}
