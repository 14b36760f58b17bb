#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Timer configuration
    // =========================
    /// Number of ticks between durable flushes of the in-memory mirror.
    ///
    /// Coalesces many per-second mutations into one store write per task.
    /// On crash between flushes, up to `save_interval_ticks - 1` seconds
    /// of accounting may be lost.
    ///
    /// Purpose:
    /// - bound write amplification (one flush per N seconds, not per second)
    /// - keep the in-memory mirror authoritative between flushes
    pub save_interval_ticks: u32,

    // =========================
    // Notification configuration
    // =========================
    /// Seconds between notification scheduler scans.
    ///
    /// Purpose:
    /// - bound reminder latency (worst case: this many seconds late)
    /// - avoid scanning every task every second
    pub notify_scan_interval_secs: u64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://dayplanner.db".to_string());

        Self {
            database_url,

            // Timer defaults:
            save_interval_ticks: 10,

            // Notification defaults:
            notify_scan_interval_secs: 30,
        }
    }
}
