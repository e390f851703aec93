use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} is not set in the environment")]
    ConfigMissing(&'static str),

    #[error("No documents found: {0}")]
    NoDocumentsFound(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("History error: {0}")]
    History(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extract;
pub mod ingest;
pub mod mcp;
pub mod retrieval;
