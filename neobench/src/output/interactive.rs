use std::fmt::Write as _;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use neobench_core::{ProgressUpdate, RunResult, ScriptResult};

use super::{write_error_report, Output};

/// Human-readable rendering: a progress bar on stderr while the run is
/// going, a textual summary on stdout at the end.
pub struct InteractiveOutput {
    bar: Mutex<Option<ProgressBar>>,
}

impl InteractiveOutput {
    #[must_use]
    pub fn new() -> Self {
        InteractiveOutput {
            bar: Mutex::new(None),
        }
    }

    fn bar_slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn finish_bar(&self) {
        if let Some(bar) = self.bar_slot().take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for InteractiveOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("benchmark [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

impl Output for InteractiveOutput {
    fn status(&self, message: &str) {
        eprintln!("{message}");
    }

    fn report_progress(&self, update: &ProgressUpdate) {
        let mut slot = self.bar_slot();
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::with_draw_target(Some(1000), ProgressDrawTarget::stderr());
            bar.set_style(bar_style());
            bar
        });
        bar.set_position((update.completeness * 1000.0) as u64);
        bar.set_message(format!("{:.1} tx/s", update.checkpoint.total_rate()));
    }

    fn report_throughput(&self, result: &RunResult) {
        self.finish_bar();

        let mut s = String::new();
        let _ = writeln!(s, "== Results ==");
        let _ = writeln!(s, "Scenario:{}", result.scenario);
        let _ = writeln!(
            s,
            "Successful Transactions: {} ({:.3} per second)",
            result.total_succeeded(),
            result.total_rate()
        );
        let _ = writeln!(s);
        for script in &result.scripts {
            let _ = writeln!(
                s,
                "  [{}]: {:.3} successful transactions per second",
                script.script_name, script.rate
            );
        }
        let _ = writeln!(s);
        write_error_report(result, &mut s);
        print!("{s}");
    }

    fn report_latency(&self, result: &RunResult) {
        self.finish_bar();

        let mut s = String::new();
        let _ = writeln!(s, "== Results ==");
        let _ = writeln!(s, "Scenario:{}", result.scenario);
        let _ = writeln!(
            s,
            "Successful Transactions: {} ({:.3} per second)",
            result.total_succeeded(),
            result.total_rate()
        );

        if result.total_succeeded() > 0 {
            for script in &result.scripts {
                let _ = writeln!(s);
                if result.scripts.len() > 1 {
                    let _ = writeln!(s, "-- Script: {} --", script.script_name);
                    let _ = writeln!(s);
                }
                summarize_latency(script, &mut s, "  ");
            }
        }
        let _ = writeln!(s);
        write_error_report(result, &mut s);
        print!("{s}");
    }

    fn error(&self, message: &str) {
        eprintln!("ERROR: {message}");
    }
}

fn summarize_latency(script: &ScriptResult, s: &mut String, indent: &str) {
    let h = &script.latencies;
    let ms = |micros: u64| micros as f64 / 1000.0;
    let mut line = |text: String| {
        s.push_str(indent);
        s.push_str(&text);
        s.push('\n');
    };

    line(format!(
        "Successful Transactions: {} ({:.3} per second)",
        script.succeeded, script.rate
    ));
    line(String::new());
    line(format!(
        "Max: {:.3}ms, Min: {:.3}ms, Mean: {:.3}ms, Stddev: {:.3}",
        ms(h.max()),
        ms(h.min()),
        h.mean() / 1000.0,
        h.stdev() / 1000.0
    ));
    line(String::new());
    line("Latency distribution:".to_string());
    line(format!("  P00.000: {:.3}ms", ms(h.min())));
    for (label, q) in [
        ("P25.000", 0.25),
        ("P50.000", 0.50),
        ("P75.000", 0.75),
        ("P95.000", 0.95),
        ("P99.000", 0.99),
        ("P99.999", 0.99999),
    ] {
        line(format!("  {label}: {:.3}ms", ms(h.value_at_quantile(q))));
    }
}
