use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use neobench_script::{CsvLoader, EvalError, Script, ScriptContext, UnitOfWork, Vars, WORKER_ID_VAR};

/// Script weights are floats; the selector works on integers. Scaling by
/// 10 000 before truncation keeps ties deterministic.
const WEIGHT_SCALE: f64 = 10_000.0;

/// Draws entries with probability proportional to their weight.
///
/// The lookup table holds the cumulative weight at each entry, which turns
/// a draw into one uniform sample over `[1, total]` plus a binary search
/// for the segment that sample lands in.
#[derive(Debug)]
pub struct WeightedRandom<T> {
    lookup: Vec<u64>,
    total_weight: u64,
    entries: Vec<T>,
}

impl<T> Default for WeightedRandom<T> {
    fn default() -> Self {
        WeightedRandom {
            lookup: Vec::new(),
            total_weight: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> WeightedRandom<T> {
    pub fn add(&mut self, entry: T, weight: u64) {
        self.total_weight += weight;
        self.lookup.push(self.total_weight);
        self.entries.push(entry);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() || self.total_weight == 0
    }

    /// Drawing from an empty selector is a programming error.
    pub fn draw(&self, rng: &mut StdRng) -> &T {
        assert!(!self.is_empty(), "draw from an empty weighted selector");
        let point = rng.gen_range(1..=self.total_weight);
        let index = self.lookup.partition_point(|&cumulative| cumulative < point);
        &self.entries[index]
    }
}

/// The scripts of a workload plus their weighted lookup; cheap to clone
/// into each client.
#[derive(Clone)]
pub struct Scripts {
    inner: Arc<ScriptsInner>,
}

struct ScriptsInner {
    scripts: Vec<Arc<Script>>,
    lookup: WeightedRandom<Arc<Script>>,
}

impl Scripts {
    #[must_use]
    pub fn new(scripts: Vec<Script>) -> Self {
        let scripts: Vec<Arc<Script>> = scripts.into_iter().map(Arc::new).collect();
        let mut lookup = WeightedRandom::default();
        for script in &scripts {
            lookup.add(script.clone(), (script.weight * WEIGHT_SCALE) as u64);
        }
        Scripts {
            inner: Arc::new(ScriptsInner { scripts, lookup }),
        }
    }

    #[must_use]
    pub fn choose(&self, rng: &mut StdRng) -> Arc<Script> {
        self.inner.lookup.draw(rng).clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Script>> {
        self.inner.scripts.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.scripts.is_empty()
    }
}

/// A full workload: global variables, weighted scripts, the shared CSV
/// cache and the master RNG that client RNGs derive from.
pub struct Workload {
    pub variables: Vars,
    pub scripts: Scripts,
    pub csv: Arc<CsvLoader>,
    rng: StdRng,
}

impl Workload {
    #[must_use]
    pub fn new(variables: Vars, scripts: Scripts, csv: Arc<CsvLoader>, seed: u64) -> Self {
        Workload {
            variables,
            scripts,
            csv,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Derive one client's workload. Each client gets a fresh RNG seeded
    /// from the master, so runs are reproducible per master seed while
    /// clients stay independent of each other.
    pub fn new_client(&mut self) -> ClientWorkload {
        ClientWorkload {
            variables: self.variables.clone(),
            scripts: self.scripts.clone(),
            csv: self.csv.clone(),
            rng: StdRng::seed_from_u64(self.rng.gen()),
        }
    }
}

pub struct ClientWorkload {
    variables: Vars,
    scripts: Scripts,
    csv: Arc<CsvLoader>,
    rng: StdRng,
}

impl ClientWorkload {
    /// Draw a script and evaluate it into the next unit of work.
    pub fn next(&mut self, worker_id: i64) -> Result<UnitOfWork, EvalError> {
        let script = self.scripts.choose(&mut self.rng);
        let mut stderr = std::io::stderr();
        let mut ctx = ScriptContext {
            script_name: &script.name,
            vars: client_vars(&self.variables, worker_id),
            rng: &mut self.rng,
            csv: &self.csv,
            debug_out: &mut stderr,
            preflight: false,
        };
        script.eval(&mut ctx)
    }
}

/// Script-visible variables: the globals plus the worker id.
#[must_use]
pub fn client_vars(globals: &Vars, worker_id: i64) -> Vars {
    let mut vars = globals.clone();
    vars.insert(WORKER_ID_VAR.to_string(), worker_id.into());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use neobench_script::parse;
    use neobench_value::Value;

    fn script(name: &str, weight: f64) -> Script {
        parse(name, "RETURN 1;", weight).expect("parses")
    }

    #[test]
    fn worker_id_is_always_in_scope() {
        let scripts = Scripts::new(vec![parse("t", "RETURN $nbWorkerId;", 1.0).unwrap()]);
        let mut workload = Workload::new(
            Vars::default(),
            scripts,
            Arc::new(CsvLoader::new()),
            1337,
        );
        let mut client = workload.new_client();
        let uow = client.next(7).expect("evaluates");
        assert_eq!(uow.statements[0].params["nbWorkerId"], Value::Int(7));
    }

    #[test]
    fn zero_weight_scripts_are_never_drawn() {
        let mut selector = WeightedRandom::default();
        selector.add("a", 10_000);
        selector.add("b", 0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert_eq!(*selector.draw(&mut rng), "a");
        }
    }

    #[test]
    fn clients_derived_from_equal_seeds_draw_identically() {
        let scripts = Scripts::new(vec![script("a", 1.0), script("b", 2.5)]);
        let csv = Arc::new(CsvLoader::new());
        let mut w1 = Workload::new(Vars::default(), scripts.clone(), csv.clone(), 42);
        let mut w2 = Workload::new(Vars::default(), scripts, csv, 42);

        let mut c1 = w1.new_client();
        let mut c2 = w2.new_client();
        for _ in 0..100 {
            assert_eq!(
                c1.next(0).expect("evaluates"),
                c2.next(0).expect("evaluates")
            );
        }
    }
}
