use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-shot broadcast stop flag, observed at the top of each worker
/// loop. A worker finishes its in-flight transaction before returning.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raw flag, for wiring into signal handlers.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}
