use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility. Observability only —
/// never read by any behavioral decision in this crate.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticks: Arc<AtomicU64>,
    pub flushes: Arc<AtomicU64>,
    pub flush_failures: Arc<AtomicU64>,
    pub notifications_fired: Arc<AtomicU64>,
    pub days_finalized: Arc<AtomicU64>,
}
