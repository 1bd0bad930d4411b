//! Call-related error types.

use thiserror::Error;

/// Failures reported synchronously to the originating caller. The core
/// never retries; benign races (unknown or already-ended sessions) are
/// silent no-ops rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("user is offline")]
    TargetUnreachable,

    #[error("user is busy in another call")]
    TargetBusy,
}

impl CallError {
    /// Stable machine-readable code carried on `call-failed` events.
    pub fn code(&self) -> &'static str {
        match self {
            CallError::TargetUnreachable => "target-unreachable",
            CallError::TargetBusy => "target-busy",
        }
    }
}
