use neobench_script::{Statement, UnitOfWork};

/// How the server classified a statement under EXPLAIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    ReadOnly,
    ReadWrite,
    WriteOnly,
    SchemaWrite,
}

impl StatementKind {
    #[must_use]
    pub fn is_read_only(self) -> bool {
        matches!(self, StatementKind::ReadOnly)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DriverError {
    /// An error the server reported, with its error code.
    #[error("Server error: [{code}] {message}")]
    Server { code: String, message: String },

    /// Connection, protocol or client-side failure.
    #[error("{0}")]
    Database(String),

    #[error("failed to open session: {0}")]
    Session(String),
}

impl DriverError {
    /// Failure-group key for error statistics. Server errors group by
    /// their code; everything else lands in `unknown`.
    #[must_use]
    pub fn group(&self) -> String {
        let message = self.to_string();
        if let Some(rest) = message.strip_prefix("Server error: [") {
            if let Some(end) = rest.find(']') {
                return rest[..end].to_string();
            }
        }
        "unknown".to_string()
    }
}

/// One client's handle to the database, held open for the whole run.
/// Implementations are not thread-safe; each worker owns its session.
pub trait Session: Send {
    /// Run every statement of the unit, in order, each result fully
    /// consumed before the next statement starts. Readonly units use a
    /// read transaction, others a write transaction; autocommit units run
    /// each statement as its own implicit transaction. The unit succeeds
    /// or fails as a whole.
    fn execute(&mut self, unit: &UnitOfWork) -> Result<(), DriverError>;

    /// `EXPLAIN` the statement inside a read transaction and report how
    /// the planner classified it.
    fn explain(&mut self, statement: &Statement) -> Result<StatementKind, DriverError>;
}

/// Factory for sessions; shared by all workers.
pub trait Driver: Send + Sync {
    fn session(&self, database: &str) -> Result<Box<dyn Session>, DriverError>;
}
