//! Runtime values for the neobench scripting language.
//!
//! Scripts are dynamically typed; this crate provides the tagged value the
//! evaluator, the parameter maps and the CSV loader all share, plus the
//! numeric coercion helper used on the hot arithmetic paths.

use std::fmt;
use std::sync::Arc;

pub type ObjectMap = ahash::AHashMap<Arc<str>, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(Arc<str>),
    List(Arc<[Value]>),
    Map(ObjectMap),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "double",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of this value, if it has one.
    #[must_use]
    pub fn as_num(&self) -> Option<Num> {
        match self {
            Value::Int(i) => Some(Num::int(*i)),
            Value::Float(f) => Some(Num::float(*f)),
            _ => None,
        }
    }

    /// Render this value as a Cypher literal, for client-side parameter
    /// substitution. Maps (and lists containing maps) have no literal
    /// rendering here and yield `None`.
    #[must_use]
    pub fn cypher_literal(&self) -> Option<String> {
        match self {
            Value::Int(i) => Some(i.to_string()),
            // {:?} keeps a fractional component (`2.0`, not `2`), so the
            // substituted literal stays a float on the server side.
            Value::Float(f) => Some(format!("{f:?}")),
            Value::Bool(b) => Some(b.to_string()),
            Value::String(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for ch in s.chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
                Some(out)
            }
            Value::List(items) => {
                let rendered: Option<Vec<String>> =
                    items.iter().map(Value::cypher_literal).collect();
                Some(format!("[{}]", rendered?.join(", ")))
            }
            Value::Map(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

/// Both views of a number at once.
///
/// Arithmetic in scripts constantly mixes ints and floats; keeping the
/// float view always populated (and the int view when the source was an
/// int) avoids re-matching on the value tag inside every operator.
#[derive(Debug, Clone, Copy)]
pub struct Num {
    is_float: bool,
    f: f64,
    // Only meaningful when is_float is false.
    i: i64,
}

impl Num {
    #[must_use]
    pub fn int(i: i64) -> Self {
        Num {
            is_float: false,
            f: i as f64,
            i,
        }
    }

    #[must_use]
    pub fn float(f: f64) -> Self {
        Num {
            is_float: true,
            f,
            i: 0,
        }
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        self.is_float
    }

    #[must_use]
    pub fn as_f64(&self) -> f64 {
        self.f
    }

    /// The integer view; truncates toward zero when the source was a float.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        if self.is_float {
            self.f as i64
        } else {
            self.i
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        if self.is_float {
            Value::Float(self.f)
        } else {
            Value::Int(self.i)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_preserves_int_view() {
        let n = Num::int(7);
        assert!(!n.is_float());
        assert_eq!(n.as_i64(), 7);
        assert_eq!(n.as_f64(), 7.0);
        assert_eq!(n.into_value(), Value::Int(7));
    }

    #[test]
    fn num_float_truncates_toward_zero() {
        assert_eq!(Num::float(9.2).as_i64(), 9);
        assert_eq!(Num::float(-9.2).as_i64(), -9);
    }

    #[test]
    fn cypher_literals() {
        assert_eq!(Value::Int(7).cypher_literal().as_deref(), Some("7"));
        assert_eq!(Value::Float(2.0).cypher_literal().as_deref(), Some("2.0"));
        assert_eq!(Value::Bool(true).cypher_literal().as_deref(), Some("true"));
        assert_eq!(
            Value::string("say \"hi\"").cypher_literal().as_deref(),
            Some("\"say \\\"hi\\\"\"")
        );
        assert_eq!(
            Value::list(vec![Value::string("hello1"), Value::Int(2)])
                .cypher_literal()
                .as_deref(),
            Some("[\"hello1\", 2]")
        );
        assert_eq!(Value::Map(ObjectMap::default()).cypher_literal(), None);
    }

    #[test]
    fn display_concatenation_forms() {
        assert_eq!(Value::Int(123).to_string(), "123");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::string("Hello").to_string(), "Hello");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }
}
