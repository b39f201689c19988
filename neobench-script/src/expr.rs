use std::fmt;
use std::io::Write as _;
use std::path::{Component, Path, PathBuf};

use neobench_value::{Num, ObjectMap, Value};

use crate::dist;
use crate::error::EvalError;
use crate::script::ScriptContext;

/// An expression tree. Operators are represented as calls (`1 + 2` is
/// `+(1, 2)`), which keeps the evaluator a single function-dispatch
/// match.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Var(String),
    Call { name: String, args: Vec<Expr> },
    Index { src: Box<Expr>, index: Box<Expr> },
    ListComp { item: String, src: Box<Expr>, out: Box<Expr> },
}

fn is_operator(name: &str) -> bool {
    matches!(name, "+" | "-" | "*" | "/" | "%")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(i) => write!(f, "{i}"),
            Expr::Float(v) => write!(f, "{v}"),
            Expr::Str(s) => write!(f, "\"{s}\""),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Expr::Var(name) => write!(f, "${name}"),
            Expr::Call { name, args } if is_operator(name) && args.len() == 2 => {
                write!(f, "{} {} {}", args[0], name, args[1])
            }
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Index { src, index } => write!(f, "{src}[{index}]"),
            Expr::ListComp { item, src, out } => write!(f, "[{item} in {src} | {out}]"),
        }
    }
}

impl Expr {
    pub fn eval(&self, ctx: &mut ScriptContext<'_>) -> Result<Value, EvalError> {
        match self {
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Str(s) => Ok(Value::string(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.eval(ctx)?);
                }
                Ok(Value::list(out))
            }
            Expr::Map(entries) => {
                let mut out = ObjectMap::default();
                for (key, value) in entries {
                    out.insert(key.as_str().into(), value.eval(ctx)?);
                }
                Ok(Value::Map(out))
            }
            Expr::Var(name) => ctx
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("this variable is not defined: {name}"))),
            Expr::Call { name, args } => eval_call(self, name, args, ctx),
            Expr::Index { src, index } => {
                let src_val = src.eval(ctx)?;
                let Some(items) = src_val.as_list() else {
                    return Err(EvalError::new(format!(
                        "indexing only works on lists, got {src_val} in {self}"
                    )));
                };
                let idx = index.eval(ctx)?;
                let Some(num) = idx.as_num() else {
                    return Err(EvalError::new(format!(
                        "expected integer as index in {self}, got {idx}"
                    )));
                };
                if num.is_float() {
                    return Err(EvalError::new(format!(
                        "floats can't be used as indexes, in {self}"
                    )));
                }
                let i = num.as_i64();
                if i < 0 || i as usize >= items.len() {
                    return Err(EvalError::new(format!(
                        "index {i} out of range for list of {}, in {self}",
                        items.len()
                    )));
                }
                Ok(items[i as usize].clone())
            }
            Expr::ListComp { item, src, out } => {
                let src_val = src.eval(ctx)?;
                let Some(items) = src_val.as_list() else {
                    return Err(EvalError::new(format!(
                        "source in list comprehension must be a list, got {src_val} from {src}"
                    )));
                };
                // The loop variable lives in a child scope; anything the
                // body sets must not leak back into the parent.
                let parent_vars = ctx.vars.clone();
                let mut results = Vec::with_capacity(items.len());
                for element in items.iter() {
                    ctx.vars.insert(item.clone(), element.clone());
                    match out.eval(ctx) {
                        Ok(v) => results.push(v),
                        Err(e) => {
                            ctx.vars = parent_vars;
                            return Err(EvalError::new(format!(
                                "when evaluating {item}={element} in {self}: {e}"
                            )));
                        }
                    }
                }
                ctx.vars = parent_vars;
                Ok(Value::list(results))
            }
        }
    }
}

fn arg_at<'e>(call: &Expr, args: &'e [Expr], i: usize) -> Result<&'e Expr, EvalError> {
    args.get(i).ok_or_else(|| {
        EvalError::new(format!(
            "in {call}: expected at least {} arguments, got {}",
            i + 1,
            args.len()
        ))
    })
}

fn arg_as_num(
    call: &Expr,
    args: &[Expr],
    i: usize,
    ctx: &mut ScriptContext<'_>,
) -> Result<Num, EvalError> {
    let value = arg_at(call, args, i)?.eval(ctx)?;
    value.as_num().ok_or_else(|| {
        EvalError::new(format!(
            "in {call}: expected a number, got {} ({})",
            value,
            value.type_name()
        ))
    })
}

fn arg_as_int_pair(
    call: &Expr,
    args: &[Expr],
    ctx: &mut ScriptContext<'_>,
    what: &str,
) -> Result<(i64, i64), EvalError> {
    let lo = arg_as_num(call, args, 0, ctx)?;
    let hi = arg_as_num(call, args, 1, ctx)?;
    if lo.is_float() || hi.is_float() {
        return Err(EvalError::new(format!(
            "interval for {what} must be integers, not doubles, in {call}"
        )));
    }
    Ok((lo.as_i64(), hi.as_i64()))
}

fn eval_call(
    call: &Expr,
    name: &str,
    args: &[Expr],
    ctx: &mut ScriptContext<'_>,
) -> Result<Value, EvalError> {
    match name {
        "abs" => {
            let a = arg_as_num(call, args, 0, ctx)?;
            if a.is_float() {
                Ok(Value::Float(a.as_f64().abs()))
            } else {
                Ok(Value::Int(a.as_i64().wrapping_abs()))
            }
        }
        "int" => {
            let a = arg_as_num(call, args, 0, ctx)?;
            Ok(Value::Int(a.as_i64()))
        }
        "double" => {
            let a = arg_as_num(call, args, 0, ctx)?;
            Ok(Value::Float(a.as_f64()))
        }
        "pi" => Ok(Value::Float(std::f64::consts::PI)),
        "sqrt" => {
            let a = arg_as_num(call, args, 0, ctx)?;
            Ok(Value::Float(a.as_f64().sqrt()))
        }
        "len" => {
            let src = arg_at(call, args, 0)?.eval(ctx)?;
            match src.as_list() {
                Some(items) => Ok(Value::Int(items.len() as i64)),
                None => Err(EvalError::new(format!(
                    "argument to len(..) needs to be a list, in {call}"
                ))),
            }
        }
        "debug" => {
            let a = arg_as_num(call, args, 0, ctx)?;
            let line = if a.is_float() {
                format!("{}\n", a.as_f64())
            } else {
                format!("{}\n", a.as_i64())
            };
            ctx.debug_out
                .write_all(line.as_bytes())
                .map_err(|e| EvalError::new(format!("in {call}: {e}")))?;
            Ok(a.into_value())
        }
        "greatest" | "least" => {
            if args.is_empty() {
                return Err(EvalError::new(format!(
                    "{name}(..) requires at least one argument"
                )));
            }
            let want_greater = name == "greatest";
            let mut best = arg_as_num(call, args, 0, ctx)?;
            let mut any_float = best.is_float();
            for i in 1..args.len() {
                let arg = arg_as_num(call, args, i, ctx)?;
                any_float = any_float || arg.is_float();
                let better = if any_float {
                    (arg.as_f64() > best.as_f64()) == want_greater
                } else {
                    (arg.as_i64() > best.as_i64()) == want_greater
                };
                if better {
                    best = arg;
                }
            }
            if any_float {
                Ok(Value::Float(best.as_f64()))
            } else {
                Ok(Value::Int(best.as_i64()))
            }
        }
        "range" => {
            let (lo, hi) = arg_as_int_pair(call, args, ctx, "range()")?;
            let mut out = Vec::new();
            let mut i = lo;
            // Inclusive on both ends, to match Cypher's range().
            while i <= hi {
                out.push(Value::Int(i));
                i += 1;
            }
            Ok(Value::list(out))
        }
        "random" => {
            let (lo, hi) = arg_as_int_pair(call, args, ctx, "random()")?;
            if lo == hi {
                return Ok(Value::Int(lo));
            }
            if hi < lo {
                return Err(EvalError::new(format!(
                    "interval for random() must not be empty, in {call}"
                )));
            }
            Ok(Value::Int(dist::uniform(ctx.rng, lo, hi)))
        }
        "random_gaussian" => {
            let (lo, hi) = arg_as_int_pair(call, args, ctx, "random_gaussian()")?;
            let param = arg_as_num(call, args, 2, ctx)?.as_f64();
            if lo == hi {
                return Ok(Value::Int(lo));
            }
            if hi < lo {
                return Err(EvalError::new(format!(
                    "interval for random_gaussian() must not be empty, in {call}"
                )));
            }
            dist::gaussian(ctx.rng, lo, hi, param)
                .map(Value::Int)
                .map_err(|e| EvalError::new(format!("in {call}: {e}")))
        }
        "random_exponential" => {
            let (lo, hi) = arg_as_int_pair(call, args, ctx, "random_exponential()")?;
            let param = arg_as_num(call, args, 2, ctx)?.as_f64();
            if lo == hi {
                return Ok(Value::Int(lo));
            }
            if hi < lo {
                return Err(EvalError::new(format!(
                    "interval for random_exponential() must not be empty, in {call}"
                )));
            }
            dist::exponential(ctx.rng, lo, hi, param)
                .map(Value::Int)
                .map_err(|e| EvalError::new(format!("in {call}: {e}")))
        }
        "random_matrix" => {
            let rows = arg_as_num(call, args, 0, ctx)?;
            if rows.is_float() {
                return Err(EvalError::new(format!(
                    "random_matrix row count must be an integer, in {call}"
                )));
            }
            let mut spec: Vec<(i64, i64)> = Vec::new();
            for column in &args[1..] {
                let raw = column.eval(ctx)?;
                let bounds = raw.as_list().and_then(|items| match items {
                    [Value::Int(lo), Value::Int(hi)] => Some((*lo, *hi)),
                    _ => None,
                });
                let Some((lo, hi)) = bounds else {
                    return Err(EvalError::new(format!(
                        "random_matrix column specs should be 2-integer lists specifying \
                         the range in that column, like '[1,14]', got {column}"
                    )));
                };
                if hi < lo {
                    return Err(EvalError::new(format!(
                        "random_matrix column range must not be empty, got {column}"
                    )));
                }
                spec.push((lo, hi));
            }
            let mut out = Vec::new();
            for _ in 0..rows.as_i64().max(0) {
                let row: Vec<Value> = spec
                    .iter()
                    .map(|&(lo, hi)| {
                        Value::Int(if lo == hi {
                            lo
                        } else {
                            dist::uniform(ctx.rng, lo, hi)
                        })
                    })
                    .collect();
                out.push(Value::list(row));
            }
            Ok(Value::list(out))
        }
        "csv" => {
            let path_val = arg_at(call, args, 0)?.eval(ctx)?;
            let Some(path) = path_val.as_str() else {
                return Err(EvalError::new(format!(
                    "csv(..) takes a string path as argument, got {path_val} in {call}"
                )));
            };
            let abs = resolve_csv_path(ctx.script_name, path)?;
            ctx.csv.load(&abs)
        }
        "+" => {
            let a = arg_at(call, args, 0)?.eval(ctx)?;
            let b = arg_at(call, args, 1)?.eval(ctx)?;
            // `+` doubles as string concatenation when either side is a
            // string; numbers are rendered into the text.
            if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                return Ok(Value::string(format!("{a}{b}")));
            }
            let (a, b) = both_nums(call, &a, &b)?;
            if a.is_float() || b.is_float() {
                Ok(Value::Float(a.as_f64() + b.as_f64()))
            } else {
                Ok(Value::Int(a.as_i64().wrapping_add(b.as_i64())))
            }
        }
        "-" => {
            let (a, b) = eval_num_pair(call, args, ctx)?;
            if a.is_float() || b.is_float() {
                Ok(Value::Float(a.as_f64() - b.as_f64()))
            } else {
                Ok(Value::Int(a.as_i64().wrapping_sub(b.as_i64())))
            }
        }
        "*" => {
            let (a, b) = eval_num_pair(call, args, ctx)?;
            if a.is_float() || b.is_float() {
                Ok(Value::Float(a.as_f64() * b.as_f64()))
            } else {
                Ok(Value::Int(a.as_i64().wrapping_mul(b.as_i64())))
            }
        }
        "/" => {
            let (a, b) = eval_num_pair(call, args, ctx)?;
            Ok(Value::Float(a.as_f64() / b.as_f64()))
        }
        "%" => {
            let (a, b) = eval_num_pair(call, args, ctx)?;
            if a.is_float() || b.is_float() {
                let which = if a.is_float() { &args[0] } else { &args[1] };
                return Err(EvalError::new(format!(
                    "modulo ('%') needs both sides to be integers, but {which} is a float"
                )));
            }
            if b.as_i64() == 0 {
                return Err(EvalError::new(format!("modulo ('%') by zero, in {call}")));
            }
            Ok(Value::Int(a.as_i64().wrapping_rem(b.as_i64())))
        }
        _ => Err(EvalError::new(format!("unknown function: {call}"))),
    }
}

fn both_nums(call: &Expr, a: &Value, b: &Value) -> Result<(Num, Num), EvalError> {
    let numify = |v: &Value| {
        v.as_num().ok_or_else(|| {
            EvalError::new(format!(
                "in {call}: expected a number, got {v} ({})",
                v.type_name()
            ))
        })
    };
    Ok((numify(a)?, numify(b)?))
}

fn eval_num_pair(
    call: &Expr,
    args: &[Expr],
    ctx: &mut ScriptContext<'_>,
) -> Result<(Num, Num), EvalError> {
    let a = arg_as_num(call, args, 0, ctx)?;
    let b = arg_as_num(call, args, 1, ctx)?;
    Ok((a, b))
}

/// Resolve a csv() path relative to the script that referenced it, so
/// separate scripts naming the same file share one cache slot.
fn resolve_csv_path(script_name: &str, path: &str) -> Result<PathBuf, EvalError> {
    if script_name.starts_with("builtin:") {
        return Err(EvalError::new(format!(
            "{script_name} is a builtin script and cannot load files: {path}"
        )));
    }
    let raw = Path::new(path);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        let dir = Path::new(script_name).parent().unwrap_or(Path::new("."));
        dir.join(raw)
    };
    // Lexical normalization only; the loader hits the filesystem anyway.
    let mut normalized = PathBuf::new();
    for part in joined.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(part.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}
