use thiserror::Error;

/// Crate-wide error taxonomy. See spec §7 for the canonical mapping of
/// variant to raiser to surfacing policy.
#[derive(Debug, Error)]
pub enum AlertCoreError {
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("invalid matcher: {0}")]
    InvalidMatcher(String),

    #[error("alert stream error: {0}")]
    StreamError(String),

    #[error("snapshot corrupt: {0}")]
    SnapshotCorrupt(String),
}

pub type AlertCoreResult<T> = Result<T, AlertCoreError>;
