use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document is empty after chunking")]
    EmptyDocument,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Document {0} not found")]
    NotFound(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod retrieval;
pub mod storage;
