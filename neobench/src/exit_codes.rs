#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean run with no failed transactions.
    Success = 0,

    /// Runtime failure: preflight error, crashed workers, or any failed
    /// transaction during the run.
    RuntimeError = 1,

    /// Invalid CLI usage (bad flags, non-numeric defines, unknown output
    /// mode, ...).
    InvalidUsage = 2,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
