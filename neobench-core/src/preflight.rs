use rand::rngs::StdRng;
use rand::SeedableRng;

use neobench_script::{CsvLoader, Script, ScriptContext, Vars};

use crate::driver::Session;
use crate::workload::client_vars;

/// Preflight always evaluates with the same seed so the read/write
/// classification of a script is deterministic.
const PREFLIGHT_SEED: u64 = 1337;

#[derive(Debug, thiserror::Error)]
#[error("script '{script}' failed preflight checks: {message}")]
pub struct PreflightError {
    pub script: String,
    pub message: String,
}

/// Validate a script before the benchmark starts: evaluate it once with
/// sleeps suppressed, then `EXPLAIN` each produced statement. Returns
/// whether every statement is read-only, which decides the transaction
/// mode the workers use for this script.
pub fn preflight(
    session: &mut dyn Session,
    script: &Script,
    variables: &Vars,
    csv: &CsvLoader,
) -> Result<bool, PreflightError> {
    let fail = |message: String| PreflightError {
        script: script.name.clone(),
        message,
    };

    let mut rng = StdRng::seed_from_u64(PREFLIGHT_SEED);
    let mut stderr = std::io::stderr();
    let mut ctx = ScriptContext {
        script_name: &script.name,
        vars: client_vars(variables, 0),
        rng: &mut rng,
        csv,
        debug_out: &mut stderr,
        preflight: true,
    };
    let unit = script.eval(&mut ctx).map_err(|e| fail(e.to_string()))?;

    let mut readonly = true;
    for statement in &unit.statements {
        let kind = session
            .explain(statement)
            .map_err(|e| fail(e.to_string()))?;
        readonly = readonly && kind.is_read_only();
    }
    Ok(readonly)
}
