use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The injected entropy source could not produce random bytes.
    /// Session-id integrity is a security invariant, so this aborts the
    /// operation instead of degrading to a weak id.
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] sessionguard_store::StoreError),
}
