use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecallError>;

/// Error taxonomy for the recall subsystem.
///
/// The variant determines propagation policy: `Storage` errors always
/// propagate, `Validation` and `Provider` errors are swallowed-and-counted
/// for independent chunks inside a best-effort batch index, and
/// `Configuration` errors are raised before any network attempt.
#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod search;
pub mod service;
pub mod similarity;
