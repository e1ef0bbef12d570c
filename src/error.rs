//! Error types for bulkstore
//!
//! This module defines the error hierarchy used across the engine:
//! - Remote store errors (returned by [`crate::store::RemoteStore`] implementations)
//! - Configuration and argument errors (validated before any thread starts)
//! - Worker thread errors (spawn failures, panics, fatal store errors)
//!
//! Per-item failures never surface as errors: the executor converts them
//! into [`crate::walker::FileStatus`] values. Only fatal conditions travel
//! up through these types.

use thiserror::Error;

/// Top-level error type for bulkstore
#[derive(Error, Debug)]
pub enum BulkError {
    /// Remote store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid source/destination argument
    #[error("Invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Errors reported by a remote store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Path does not exist
    #[error("Path not found: '{path}'")]
    NotFound { path: String },

    /// Target already exists and overwrite was not requested
    #[error("Path already exists: '{path}'")]
    AlreadyExists { path: String },

    /// Listing was requested on something that is not a directory
    #[error("Not a directory: '{path}'")]
    NotADirectory { path: String },

    /// Path is malformed or escapes the store root
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Underlying I/O failure
    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    /// Error response from the remote service
    #[error("Remote error {status} on '{path}': {message}")]
    Remote {
        status: u16,
        path: String,
        message: String,
    },
}

impl StoreError {
    /// Wrap an I/O error with the store path it happened on
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound { path }
        } else {
            StoreError::Io {
                path,
                reason: err.to_string(),
            }
        }
    }

    /// Check if this error means the entry vanished (HTTP 404 equivalent)
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Remote { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Returns the path associated with this error
    pub fn path(&self) -> &str {
        match self {
            StoreError::NotFound { path }
            | StoreError::AlreadyExists { path }
            | StoreError::NotADirectory { path }
            | StoreError::InvalidPath { path, .. }
            | StoreError::Io { path, .. }
            | StoreError::Remote { path, .. } => path,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid enumerator thread count
    #[error("Invalid enumerator count {count}: must be between 1 and {max}")]
    InvalidEnumeratorCount { count: usize, max: usize },

    /// Chunk size must be positive
    #[error("Invalid chunk size {size}: must be greater than zero")]
    InvalidChunkSize { size: u64 },

    /// Threshold below chunk size
    #[error("Invalid threshold {threshold}: must be at least the chunk size {chunk_size}")]
    InvalidThreshold { threshold: u64, chunk_size: u64 },

    /// Copy buffer size must be positive
    #[error("Invalid buffer size {size}: must be greater than zero")]
    InvalidBufferSize { size: usize },

    /// Listing page size must be positive
    #[error("Invalid {which} page size {size}: must be greater than zero")]
    InvalidPageSize { which: &'static str, size: usize },

    /// Job queue capacity must be positive
    #[error("Invalid queue capacity {capacity}: must be greater than zero")]
    InvalidQueueCapacity { capacity: usize },

    /// ACL spec could not be parsed
    #[error("Invalid ACL spec '{spec}': {reason}")]
    InvalidAclSpec { spec: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Unrecoverable store error raised inside a worker
    #[error("Worker {id} store error: {source}")]
    Store { id: usize, source: StoreError },
}

/// Result type alias for BulkError
pub type Result<T> = std::result::Result<T, BulkError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;
