use thiserror::Error;

use crate::node::Flags;

/// Reasons `Graph::unroll` can refuse to expand a graph.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum UnrollError {
    #[error("graph has no recurrent state leaf to unroll")]
    NotRecurrent,

    #[error("unroll length must be at least 1, got {0}")]
    InvalidLength(usize),
}

/// Custom error type for the neurograph engine.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq for easier testing
pub enum NeuroGraphError {
    /// Structural problem detected while building or validating a graph.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Invalid node reference {index} (graph has {len} nodes)")]
    InvalidNode { index: usize, len: usize },

    #[error("No node matches flags {flag:?} and label {label}")]
    NodeNotFound { flag: Flags, label: i32 },

    #[error("{count} nodes match flags {flag:?} and label {label}, expected exactly one")]
    AmbiguousNode { flag: Flags, label: i32, count: usize },

    #[error("Feed count mismatch: {expected} matching feed leaves, {actual} buffers supplied")]
    FeedCountMismatch { expected: usize, actual: usize },

    #[error("Feed buffer of node {node} holds {actual} values, needs at least {expected}")]
    FeedSizeMismatch {
        node: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Feed leaf {node} has no bound buffer")]
    UnboundFeed { node: usize },

    #[error("Unroll error: {0}")]
    UnrollError(#[from] UnrollError),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Corrupt model: {0}")]
    CorruptModel(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Failed to acquire {lock_type} lock: {reason}")]
    LockError { lock_type: String, reason: String },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for NeuroGraphError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                NeuroGraphError::IoError("model stream is truncated".to_string())
            }
            _ => NeuroGraphError::IoError(err.to_string()),
        }
    }
}
