// LanceDB vector database module
// Chunk records with their embeddings, upserted by id and searched by cosine distance


pub mod vector_store;

pub use vector_store::{INDEX_MIN_ROWS, VectorStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::ContentChunk;

/// Chunk record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Deterministic identifier derived from source, page and chunk index
    pub id: String,
    /// The embedding of `metadata.text`
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Text and provenance stored alongside a chunk's embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// The chunk text, returned verbatim by searches
    pub text: String,
    /// Path of the PDF the chunk came from
    pub source: String,
    /// Zero-based page number within the source
    pub page: u32,
    /// Index of the chunk within its page
    pub chunk_index: u32,
    /// RFC 3339 timestamp of ingestion
    pub created_at: String,
}

/// A stored chunk returned by a similarity search, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query vector
    pub distance: f32,
}

impl ChunkRecord {
    #[inline]
    pub fn from_chunk(chunk: &ContentChunk, vector: Vec<f32>) -> Self {
        let chunk_index = u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX);
        Self {
            id: chunk_id(&chunk.source, chunk.page, chunk_index),
            vector,
            metadata: ChunkMetadata {
                text: chunk.content.clone(),
                source: chunk.source.clone(),
                page: chunk.page,
                chunk_index,
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Stable id for a chunk position, so re-ingesting a file overwrites its rows
#[inline]
pub fn chunk_id(source: &str, page: u32, chunk_index: u32) -> String {
    let key = format!("{source}#{page}#{chunk_index}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}
