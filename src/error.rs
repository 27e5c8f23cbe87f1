use thiserror::Error;

/// Failure kinds surfaced by the chain core.
///
/// Structural rejections (a stale `prev_hash`, no quorum) are not errors; they
/// are reported as plain values by the operation that detected them.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("hash mismatch at index {index}: expected {expected}, got {actual}")]
    HashMismatch {
        index: u64,
        expected: String,
        actual: String,
    },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("invalid amount {0}")]
    InvalidAmount(f64),

    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("unknown component {0}")]
    UnknownComponent(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;
