
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::extract::DocumentPage;

/// Represents a chunk of page text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    /// The chunk text
    pub content: String,
    /// Path of the file the chunk was read from
    pub source: String,
    /// Zero-based page number within the source
    pub page: u32,
    /// The index of this chunk within its page
    pub chunk_index: usize,
    /// Length of the chunk in characters
    pub char_count: usize,
}

/// Configuration for the recursive character splitter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum window size in characters
    pub chunk_size: usize,
    /// Characters of trailing context carried into the next window
    pub chunk_overlap: usize,
    /// Separators tried in order, the empty string splits into characters
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                String::new(),
            ],
        }
    }
}

/// Split every page into overlapping chunks, keeping page metadata
#[inline]
pub fn chunk_pages(pages: &[DocumentPage], config: &ChunkingConfig) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for (chunk_index, content) in split_text(&page.text, config).into_iter().enumerate() {
            chunks.push(ContentChunk {
                char_count: char_len(&content),
                content,
                source: page.source.clone(),
                page: page.page,
                chunk_index,
            });
        }
    }

    debug!(
        "Split {} pages into {} chunks (avg {} chars)",
        pages.len(),
        chunks.len(),
        chunks.iter().map(|c| c.char_count).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split text into windows of at most `chunk_size` characters that overlap by
/// up to `chunk_overlap` characters, preferring the earliest separator that
/// occurs in the text.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let separators: Vec<&str> = config.separators.iter().map(String::as_str).collect();
    split_recursive(text, &separators, config)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut final_chunks = Vec::new();
    let (separator, finer_separators) = pick_separator(text, separators);

    let mut good_splits: Vec<&str> = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            good_splits.push(piece);
            continue;
        }

        if !good_splits.is_empty() {
            final_chunks.extend(merge_splits(&good_splits, config));
            good_splits.clear();
        }

        if finer_separators.is_empty() {
            final_chunks.push(piece.to_string());
        } else {
            final_chunks.extend(split_recursive(piece, finer_separators, config));
        }
    }

    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(&good_splits, config));
    }

    final_chunks
}

/// First separator present in the text, plus the finer separators after it
fn pick_separator<'a, 's>(text: &str, separators: &'s [&'a str]) -> (&'a str, &'s [&'a str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[i + 1..]);
        }
    }

    (separators.last().copied().unwrap_or_default(), &[])
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. Empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Greedily pack small pieces into windows, then drop pieces from the front
/// until only the overlap remains before starting the next window.
fn merge_splits(splits: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for &piece in splits {
        let len = char_len(piece);

        if total + len > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total, config.chunk_size
                );
            }

            if !current.is_empty() {
                if let Some(doc) = join_trimmed(&current) {
                    docs.push(doc);
                }

                while total > config.chunk_overlap || (total + len > config.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }
        }

        current.push_back(piece);
        total += len;
    }

    if let Some(doc) = join_trimmed(&current) {
        docs.push(doc);
    }

    docs
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
