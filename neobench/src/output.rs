use std::io::IsTerminal as _;

use neobench_core::{ProgressUpdate, RunResult};

use crate::cli::OutputFormat;

mod csv;
mod interactive;

pub use csv::CsvOutput;
pub use interactive::InteractiveOutput;

/// Rendering surface for a run. Implementations are shared between the
/// coordinator (checkpoints) and the main thread (final report), so they
/// take `&self` and synchronise internally.
pub trait Output: Send + Sync {
    /// A one-line status message (initialisation steps, phase changes).
    fn status(&self, message: &str);

    /// A progress checkpoint during the benchmark.
    fn report_progress(&self, update: &ProgressUpdate);

    /// Final report for a throughput-mode run.
    fn report_throughput(&self, result: &RunResult);

    /// Final report for a latency-mode run.
    fn report_latency(&self, result: &RunResult);

    fn error(&self, message: &str);
}

pub fn formatter(format: OutputFormat) -> Box<dyn Output> {
    match format {
        OutputFormat::Interactive => Box::new(InteractiveOutput::new()),
        OutputFormat::Csv => Box::new(CsvOutput::new()),
        OutputFormat::Auto => {
            if std::io::stdout().is_terminal() {
                Box::new(InteractiveOutput::new())
            } else {
                Box::new(CsvOutput::new())
            }
        }
    }
}

/// Error statistics shared by both renderers.
pub(crate) fn write_error_report(result: &RunResult, out: &mut String) {
    use std::fmt::Write as _;

    let _ = writeln!(out, "Error stats:");
    if result.total_failed() == 0 {
        let _ = writeln!(out, "  No errors!");
        return;
    }
    let failed = result.total_failed();
    let total = failed + result.total_succeeded();
    let _ = writeln!(
        out,
        "  Failed transactions: {} ({:.3} %)",
        failed,
        100.0 * failed as f64 / total as f64
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  Causes:");
    let mut groups: Vec<_> = result.failed_by_group.iter().collect();
    groups.sort_by(|a, b| a.0.cmp(b.0));
    for (name, info) in groups {
        let _ = writeln!(out, "    {}: {} failures", name, info.count);
        let _ = writeln!(out, "      (ex: {})", info.first_error);
    }
}
