//! Core traits for execution and storage.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{LibrarySet, OutputChunk};

/// Channel the backend streams stdout/stderr text into.
pub type StreamSender = mpsc::UnboundedSender<OutputChunk>;

/// Execution backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Python runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Failed to load library {library}: {message}")]
    LibraryLoad { library: String, message: String },
    /// Uncaught error raised by the user's source.
    #[error("{0}")]
    Runtime(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for the engine that executes Python source.
///
/// Initialization is split in two phases so callers can report
/// progress for each of them.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Acquire the interpreter.
    async fn load_runtime(&self) -> Result<(), BackendError>;

    /// Make `libraries` importable.
    async fn load_libraries(&self, libraries: &LibrarySet) -> Result<(), BackendError>;

    /// Run the source, streaming text into `output` as it is emitted.
    ///
    /// Returns `BackendError::Runtime` when the source raises.
    async fn run_source(&self, source: &str, output: StreamSender) -> Result<(), BackendError>;

    /// Plots produced by the last run, base64 encoded, in creation order.
    async fn collect_images(&self) -> Result<Vec<String>, BackendError>;
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Durable string key-value storage for client preferences.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Missing keys are not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
