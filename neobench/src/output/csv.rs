use std::fmt::Write as _;

use neobench_core::{ProgressUpdate, RunResult, ScriptResult};

use super::{write_error_report, Output};

/// Machine-readable rendering: one CSV table on stdout, progress and
/// error statistics on stderr.
pub struct CsvOutput;

impl CsvOutput {
    #[must_use]
    pub fn new() -> Self {
        CsvOutput
    }

    fn report(&self, result: &RunResult) {
        print!("{}", render_csv(result));
        if result.total_failed() > 0 {
            let mut s = String::new();
            write_error_report(result, &mut s);
            eprint!("{s}");
        }
    }
}

impl Default for CsvOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Output for CsvOutput {
    fn status(&self, message: &str) {
        eprintln!("{message}");
    }

    fn report_progress(&self, update: &ProgressUpdate) {
        eprintln!(
            "[benchmark] {:.2}% ({:.1} tx/s)",
            update.completeness * 100.0,
            update.checkpoint.total_rate()
        );
    }

    fn report_throughput(&self, result: &RunResult) {
        self.report(result);
    }

    fn report_latency(&self, result: &RunResult) {
        self.report(result);
    }

    fn error(&self, message: &str) {
        eprintln!("ERROR: {message}");
    }
}

/// All latency columns are milliseconds.
pub(crate) fn render_csv(result: &RunResult) -> String {
    let mut s = String::new();
    let _ = writeln!(
        s,
        "db,script,rate,succeeded,failed,mean,stdev,p0,p25,p50,p75,p99,p99999,p100"
    );
    for script in &result.scripts {
        let _ = writeln!(s, "{}", render_row(&result.database_name, script));
    }
    s
}

fn render_row(db: &str, script: &ScriptResult) -> String {
    let h = &script.latencies;
    let ms = |micros: u64| micros as f64 / 1000.0;
    let cells = [
        format!("{:.3}", script.rate),
        format!("{}", h.len()),
        format!("{}", script.failed),
        format!("{:.3}", h.mean() / 1000.0),
        format!("{:.3}", h.stdev() / 1000.0),
        format!("{:.3}", ms(h.min())),
        format!("{:.3}", ms(h.value_at_quantile(0.25))),
        format!("{:.3}", ms(h.value_at_quantile(0.50))),
        format!("{:.3}", ms(h.value_at_quantile(0.75))),
        format!("{:.3}", ms(h.value_at_quantile(0.99))),
        format!("{:.3}", ms(h.value_at_quantile(0.99999))),
        format!("{:.3}", ms(h.max())),
    ];
    format!("\"{db}\",\"{}\",{}", script.script_name, cells.join(","))
}
