use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use neobench_value::Value;

use crate::error::EvalError;

type OpenFn = dyn Fn(&Path) -> std::io::Result<Box<dyn Read>> + Send + Sync;

/// Caching, concurrency-safe source for `csv(..)` data.
///
/// The first caller for a path parses the file; everyone after that gets
/// the cached rows. Rows are shared by reference, so handing the same
/// table to every client costs nothing per draw.
pub struct CsvLoader {
    cache: RwLock<AHashMap<PathBuf, Arc<[Value]>>>,
    open: Box<OpenFn>,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvLoader {
    pub fn new() -> Self {
        CsvLoader {
            cache: RwLock::new(AHashMap::new()),
            open: Box::new(|path| {
                std::fs::File::open(path).map(|f| Box::new(f) as Box<dyn Read>)
            }),
        }
    }

    /// Loader reading from a custom source instead of the filesystem.
    pub fn with_source(
        open: impl Fn(&Path) -> std::io::Result<Box<dyn Read>> + Send + Sync + 'static,
    ) -> Self {
        CsvLoader {
            cache: RwLock::new(AHashMap::new()),
            open: Box::new(open),
        }
    }

    pub fn load(&self, path: &Path) -> Result<Value, EvalError> {
        if let Some(rows) = self.cache.read().get(path) {
            return Ok(Value::List(rows.clone()));
        }

        // The read lock is gone; take the write lock and re-check in case
        // another client loaded the file in between.
        let mut cache = self.cache.write();
        if let Some(rows) = cache.get(path) {
            return Ok(Value::List(rows.clone()));
        }

        let mut reader = (self.open)(path)
            .map_err(|e| EvalError::new(format!("failed to read csv '{}': {e}", path.display())))?;
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| EvalError::new(format!("error while reading CSV '{}': {e}", path.display())))?;

        let rows: Vec<Value> = parse_records(&text)
            .into_iter()
            .map(|record| Value::list(record.iter().map(|cell| parse_cell(cell)).collect()))
            .collect();
        let rows: Arc<[Value]> = Arc::from(rows);

        cache.insert(path.to_path_buf(), rows.clone());
        Ok(Value::List(rows))
    }
}

/// Minimal CSV reader: comma-separated, double-quoted fields with `""`
/// escapes, quoted fields may span lines, leading whitespace trimmed.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut field_started = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !field_started => {}
            '"' if !field_started => {
                field_started = true;
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            field.push('"');
                        } else {
                            break;
                        }
                    } else {
                        field.push(c);
                    }
                }
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' => {}
            '\n' => {
                if field_started || !field.is_empty() || !record.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            c => {
                field_started = true;
                field.push(c);
            }
        }
    }
    if field_started || !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

/// Cells are typed by inference: int, then float, then raw string.
fn parse_cell(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    Value::string(raw)
}
