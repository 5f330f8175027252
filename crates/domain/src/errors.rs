use thiserror::Error;

/// Error taxonomy shared by aggregate mutations and the use cases built on them.
///
/// `Validation` and `Conflict` are caller mistakes and are never retried.
/// `LockContention` is transient; callers drop the triggering event and let
/// the event source redeliver. `UpstreamMismatch` marks billing data that
/// disagrees with local state and is only fixable by a full resync.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed on `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("subscriber record is held by another writer")]
    LockContention,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream mismatch: {0}")]
    UpstreamMismatch(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// True for errors that a caller may safely absorb with a warning log
    /// instead of failing the surrounding pipeline.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            Self::LockContention | Self::NotFound(_) | Self::UpstreamMismatch(_)
        )
    }
}
