use thiserror::Error;

/// Errors surfaced across the engine's public API.
///
/// Concurrency retries (CAS helping, lock-free contention) never reach this
/// type — they are bounded retry loops handled internally. Only I/O,
/// corruption, and programmer-error conditions are surfaced to callers.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record in snapshot dump: {0}")]
    CorruptRecord(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
