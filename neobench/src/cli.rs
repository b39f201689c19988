use std::time::Duration;

use clap::Parser;

use neobench_value::Value;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 60, 10s, 250ms)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!("invalid duration '{s}' (expected e.g. 60, 10s, 250ms)"));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 60, 10s, 250ms)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "us" | "usec" | "usecs" | "microsecond" | "microseconds" => {
            Ok(Duration::from_micros(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60 * 60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!("invalid duration '{s}' (expected e.g. 60, 10s, 250ms)")),
    }
}

/// A `--define NAME=VALUE` pair; values are integers or floats.
#[derive(Debug, Clone)]
pub struct Define {
    pub name: String,
    pub value: Value,
}

fn parse_define(input: &str) -> Result<Define, String> {
    let (name, raw) = input
        .split_once('=')
        .ok_or_else(|| format!("invalid define (expected NAME=VALUE): {input}"))?;
    if name.is_empty() {
        return Err(format!("invalid define (empty NAME): {input}"));
    }
    let value = if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        return Err(format!(
            "define values must be integers or floats, failed to parse '{raw}'"
        ));
    };
    Ok(Define {
        name: name.to_string(),
        value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EncryptionArg {
    /// Probe the server port with an unverified TLS handshake.
    Auto,
    /// Always encrypt.
    True,
    /// Never encrypt.
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// CSV when stdout is redirected, interactive otherwise.
    Auto,
    /// Human-readable summary.
    Interactive,
    /// Machine-readable CSV on stdout.
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "neobench",
    author,
    version,
    about = "Scriptable benchmarking workbench for Neo4j",
    long_about = "neobench runs workload scripts against a Neo4j-compatible database and reports \
either throughput or a coordinated-omission-corrected latency distribution.\n\n\
Workloads are plain text scripts: lines starting with ':' are meta-commands (:set, :sleep, \
:opt autocommit), everything else is a Cypher statement terminated by ';'. Each workload can \
be given a relative weight with an '@' suffix, e.g. --file checkout.script@2.5",
    after_help = "Examples:\n  neobench -a neo4j://localhost:7687 --builtin tpcb-like --init -d 60\n  \
neobench --file my.script --clients 8 --latency --rate 200\n  \
neobench --builtin tpcb-like@10 --builtin match-only@1 -o csv mydb"
)]
pub struct Cli {
    /// Address to connect to
    #[arg(short, long, default_value = "neo4j://localhost:7687")]
    pub address: String,

    /// Username
    #[arg(short, long, default_value = "neo4j")]
    pub user: String,

    /// Password
    #[arg(short, long, default_value = "neo4j")]
    pub password: String,

    /// TLS policy
    #[arg(short, long, value_enum, default_value_t = EncryptionArg::Auto)]
    pub encryption: EncryptionArg,

    /// Disable certificate verification when encryption is on
    #[arg(long)]
    pub no_check_certificates: bool,

    /// Number of concurrent clients / sessions
    #[arg(short, long, default_value_t = 1)]
    pub clients: usize,

    /// How long to run the benchmark (e.g. 60, 30s, 5m); 0 runs
    /// initialisation only
    #[arg(short, long, value_parser = parse_duration, default_value = "60")]
    pub duration: Duration,

    /// Measure latency at a fixed rate instead of maximum throughput
    #[arg(short, long)]
    pub latency: bool,

    /// Target transactions per second, total across all clients; only
    /// applies with --latency
    #[arg(short, long, default_value_t = 1.0)]
    pub rate: f64,

    /// Sets the `scale` variable; impact depends on the workload
    #[arg(short, long, default_value_t = 1)]
    pub scale: i64,

    /// Define a variable visible to workload scripts (repeatable,
    /// NAME=VALUE, integers or floats)
    #[arg(short = 'D', long = "define", value_parser = parse_define)]
    pub define: Vec<Define>,

    /// Built-in workload to run (tpcb-like or match-only), optionally
    /// weighted with @<weight> (repeatable)
    #[arg(short, long = "builtin")]
    pub builtin: Vec<String>,

    /// Path to a workload script, optionally weighted with @<weight>
    /// (repeatable)
    #[arg(short, long = "file")]
    pub file: Vec<String>,

    /// Inline workload script text, optionally weighted with @<weight>
    /// (repeatable)
    #[arg(short = 'S', long = "script")]
    pub script: Vec<String>,

    /// Initialise the dataset for the chosen built-in workloads before
    /// running
    #[arg(short, long)]
    pub init: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Auto)]
    pub output: OutputFormat,

    /// Interval between progress checkpoints
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub progress: Duration,

    /// Target database name (defaults to the server's default database)
    #[arg(value_name = "DBNAME")]
    pub database: Option<String>,
}

/// A workload requested on the command line, with its `@weight` suffix
/// split off (default weight 1.0).
#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadSpec {
    Builtin { name: String, weight: f64 },
    File { path: String, weight: f64 },
    Inline { text: String, weight: f64 },
}

pub fn split_weight(raw: &str) -> Result<(String, f64), String> {
    match raw.rsplit_once('@') {
        Some((head, tail)) => {
            let weight: f64 = tail.parse().map_err(|_| {
                format!("value after @ symbol for workload weight must be a number: {raw}")
            })?;
            if weight <= 0.0 {
                return Err(format!("workload weight must be positive: {raw}"));
            }
            Ok((head.to_string(), weight))
        }
        None => Ok((raw.to_string(), 1.0)),
    }
}

impl Cli {
    /// The workloads to run, in flag order; defaults to the TPC-B-like
    /// builtin when nothing was requested.
    pub fn workloads(&self) -> Result<Vec<WorkloadSpec>, String> {
        let mut specs = Vec::new();
        for raw in &self.builtin {
            let (name, weight) = split_weight(raw)?;
            specs.push(WorkloadSpec::Builtin { name, weight });
        }
        for raw in &self.file {
            let (path, weight) = split_weight(raw)?;
            specs.push(WorkloadSpec::File { path, weight });
        }
        for raw in &self.script {
            let (text, weight) = split_weight(raw)?;
            specs.push(WorkloadSpec::Inline { text, weight });
        }
        if specs.is_empty() {
            specs.push(WorkloadSpec::Builtin {
                name: "tpcb-like".to_string(),
                weight: 1.0,
            });
        }
        Ok(specs)
    }

    /// Reconstructed command line, carried into reports so a result file
    /// says what produced it.
    pub fn describe_scenario(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        for raw in &self.builtin {
            let _ = write!(out, " -b {raw}");
        }
        for raw in &self.file {
            let _ = write!(out, " -f {raw}");
        }
        for raw in &self.script {
            let _ = write!(out, " -S '{raw}'");
        }
        let _ = write!(
            out,
            " -c {} -s {} -d {}s -e {}",
            self.clients,
            self.scale,
            self.duration.as_secs(),
            match self.encryption {
                EncryptionArg::Auto => "auto",
                EncryptionArg::True => "true",
                EncryptionArg::False => "false",
            }
        );
        if self.latency {
            let _ = write!(out, " -l -r {:.3}", self.rate);
        }
        if self.init {
            out.push_str(" -i");
        }
        out
    }
}
