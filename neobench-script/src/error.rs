/// Error from tokenizing or parsing a script, carrying the source
/// position the parser gave up at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (at {file}:{line}:{col})")]
pub struct ParseError {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, file: &str, line: u32, col: u32) -> Self {
        ParseError {
            message: message.into(),
            file: file.to_string(),
            line,
            col,
        }
    }
}

/// Error from evaluating a parsed script against a context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        EvalError(message.into())
    }
}
