use crate::exit_codes::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Bad flags or workload specs; exit 2.
    #[error("{0:#}")]
    InvalidInput(anyhow::Error),

    /// Anything fatal at runtime: connection failures, parse or preflight
    /// errors, a run with no surviving workers; exit 1.
    #[error("{0:#}")]
    Runtime(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunError::InvalidInput(_) => ExitCode::InvalidUsage,
            RunError::Runtime(_) => ExitCode::RuntimeError,
        }
    }
}
