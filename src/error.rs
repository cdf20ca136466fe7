use thiserror::Error;

/// Storage-layer failures. Any of these aborts the in-flight batch.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("entity serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sync state codec error: {0}")]
    Codec(String),
    #[error("storage fault: {0}")]
    Fault(String),
}

/// Why a single incoming record could not be turned into a typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("record declared as {declared} but carries {actual} data")]
    TypeMismatch { declared: String, actual: String },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Errors raised by the remote catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("remote catalog unavailable: {0}")]
    Unavailable(String),
    #[error("remote catalog rejected cursor {0}")]
    InvalidCursor(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("a {sync_type} sync is already running")]
    ReentrantSync { sync_type: String },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("batch cancelled after {committed} committed records")]
    Cancelled { committed: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("sync worker thread panicked")]
    WorkerPanicked,
}

impl ReplicaError {
    /// Errors that move an active sync to `Failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplicaError::Storage(_) | ReplicaError::Source(_))
    }
}

pub type Result<T, E = ReplicaError> = std::result::Result<T, E>;
