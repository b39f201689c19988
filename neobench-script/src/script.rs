use std::io::Write;
use std::time::Duration;

use ahash::AHashMap;
use rand::rngs::StdRng;

use neobench_value::Value;

use crate::csv::CsvLoader;
use crate::error::EvalError;
use crate::expr::Expr;

/// Variable always in scope, naming the worker evaluating the script.
/// Useful for sharding workloads across clients.
pub const WORKER_ID_VAR: &str = "nbWorkerId";

pub type Vars = AHashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepUnit {
    Micros,
    Millis,
    Seconds,
}

impl SleepUnit {
    #[must_use]
    pub fn duration(self, n: i64) -> Duration {
        if n <= 0 {
            return Duration::ZERO;
        }
        let n = n as u64;
        match self {
            SleepUnit::Micros => Duration::from_micros(n),
            SleepUnit::Millis => Duration::from_millis(n),
            SleepUnit::Seconds => Duration::from_secs(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set {
        var: String,
        expr: Expr,
    },
    Sleep {
        duration: Expr,
        unit: SleepUnit,
    },
    Query {
        text: String,
        /// Referenced as `$name`, `{name}` or `` {`name`} ``; sent to the
        /// server in the parameter map.
        remote_params: Vec<String>,
        /// Referenced as `$$name`; substituted into the query text as
        /// literals before sending.
        local_params: Vec<String>,
    },
}

/// A parsed workload script. Immutable once parsing (and preflight
/// classification) is done; shared by every client.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    /// Path to the user-provided file, or `builtin:<name>`.
    pub name: String,
    pub weight: f64,
    pub readonly: bool,
    pub autocommit: bool,
    pub commands: Vec<Command>,
}

/// Per-invocation scratch a script evaluates against. Recreated for every
/// unit of work, so it stays light.
pub struct ScriptContext<'a> {
    pub script_name: &'a str,
    pub vars: Vars,
    pub rng: &'a mut StdRng,
    pub csv: &'a CsvLoader,
    pub debug_out: &'a mut dyn Write,
    /// Suppresses sleeps; set while validating scripts before the run.
    pub preflight: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub query: String,
    pub params: AHashMap<String, Value>,
}

/// The ordered statements produced by one evaluation of one script,
/// executed in a single database transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOfWork {
    pub script_name: String,
    pub readonly: bool,
    pub autocommit: bool,
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn eval(&self, ctx: &mut ScriptContext<'_>) -> Result<UnitOfWork, EvalError> {
        let mut uow = UnitOfWork {
            script_name: self.name.clone(),
            readonly: self.readonly,
            autocommit: self.autocommit,
            statements: Vec::new(),
        };
        for command in &self.commands {
            command.execute(ctx, &mut uow)?;
        }
        Ok(uow)
    }
}

impl Command {
    fn execute(&self, ctx: &mut ScriptContext<'_>, uow: &mut UnitOfWork) -> Result<(), EvalError> {
        match self {
            Command::Set { var, expr } => {
                let value = expr.eval(ctx)?;
                ctx.vars.insert(var.clone(), value);
                Ok(())
            }
            Command::Sleep { duration, unit } => {
                if ctx.preflight {
                    return Ok(());
                }
                let value = duration.eval(ctx)?;
                let Value::Int(n) = value else {
                    return Err(EvalError::new(format!(
                        ":sleep must be given an integer expression, got {value}"
                    )));
                };
                std::thread::sleep(unit.duration(n));
                Ok(())
            }
            Command::Query {
                text,
                remote_params,
                local_params,
            } => {
                let mut params = AHashMap::with_capacity(remote_params.len());
                for name in remote_params {
                    let value = ctx.vars.get(name).ok_or_else(|| {
                        EvalError::new(format!("this variable is not defined: {name}"))
                    })?;
                    params.insert(name.clone(), value.clone());
                }
                let query = if local_params.is_empty() {
                    text.clone()
                } else {
                    substitute_locals(text, &ctx.vars)?
                };
                uow.statements.push(Statement { query, params });
                Ok(())
            }
        }
    }
}

/// Replace each `$$name` in the query text with the Cypher-literal
/// rendering of the variable's current value.
fn substitute_locals(text: &str, vars: &Vars) -> Result<String, EvalError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'$') {
            out.push(ch);
            continue;
        }
        chars.next();

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            out.push_str("$$");
            continue;
        }
        let value = vars
            .get(&name)
            .ok_or_else(|| EvalError::new(format!("this variable is not defined: {name}")))?;
        let literal = value.cypher_literal().ok_or_else(|| {
            EvalError::new(format!(
                "maps can't be substituted as client-side literals: $${name}"
            ))
        })?;
        out.push_str(&literal);
    }
    Ok(out)
}
