use thiserror::Error;

/// Error taxonomy for fallible core operations (spec §7).
///
/// Engine commands (add/remove/update/activate/complete/skip/deactivate)
/// never raise on unknown ids; those are idempotent no-ops, not errors.
/// Transient store failures during flush are logged and swallowed, never
/// surfaced here — see `logger::warn_if_slow` call sites.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
}
