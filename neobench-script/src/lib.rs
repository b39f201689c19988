//! The neobench script compiler: tokenizer, parser and evaluator for the
//! meta-command / Cypher-statement mini-language, plus the CSV data
//! source scripts can draw synthetic data from.
//!
//! A script is a sequence of commands. Lines starting with `:` are
//! meta-commands (`:set`, `:sleep`, `:opt`); anything else is a Cypher
//! statement read verbatim up to the next `;`. Evaluating a script against
//! a [`ScriptContext`] yields a [`UnitOfWork`]: the statements to run in
//! one transaction, with exactly the parameters each query references.

mod csv;
mod error;
mod expr;
mod lexer;
mod parser;
mod script;

pub mod dist;

pub use csv::CsvLoader;
pub use error::{EvalError, ParseError};
pub use expr::Expr;
pub use parser::parse;
pub use script::{
    Command, Script, ScriptContext, SleepUnit, Statement, UnitOfWork, Vars, WORKER_ID_VAR,
};
