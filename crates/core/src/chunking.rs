use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{DocumentChunk, DocumentFingerprint};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 4_500;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 1_000;

/// Tried in order; the empty separator splits into single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_MAX_CHARS,
            overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits `text` recursively on paragraph, line, word and character
/// boundaries, then merges neighbouring pieces back into chunks of at most
/// `max_chars` characters that share up to `overlap_chars` characters.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut separator = "";
    let mut remaining: &[&str] = &[];
    for (position, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            break;
        }
        if text.contains(candidate) {
            separator = candidate;
            remaining = &separators[position + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.max_chars {
            fitting.push(piece);
            continue;
        }

        if !fitting.is_empty() {
            chunks.extend(merge_pieces(&fitting, config));
            fitting.clear();
        }

        if remaining.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !fitting.is_empty() {
        chunks.extend(merge_pieces(&fitting, config));
    }

    chunks
}

/// Each separator occurrence stays attached to the start of the piece after it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        pieces.push(&text[start..index]);
        start = index;
    }
    pieces.push(&text[start..]);

    pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
}

fn merge_pieces(pieces: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut merged = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let length = char_len(piece);

        if total + length > config.max_chars && !window.is_empty() {
            if let Some(chunk) = join_window(&window) {
                merged.push(chunk);
            }

            while total > config.overlap_chars || (total + length > config.max_chars && total > 0) {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }

        window.push_back(piece);
        total += length;
    }

    if let Some(chunk) = join_window(&window) {
        merged.push(chunk);
    }

    merged
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Chunks every page of a document. Chunks never span pages.
pub fn build_chunks(
    document: &DocumentFingerprint,
    pages: &[PageText],
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        let mut search_from = 0usize;
        for text in split_text(&page.text, config) {
            let byte_start = page.text[search_from..]
                .find(&text)
                .map(|found| search_from + found)
                .unwrap_or(search_from);
            let offset = char_len(&page.text[..byte_start]);
            search_from = next_char_boundary(&page.text, byte_start);

            chunks.push(DocumentChunk {
                chunk_id: make_chunk_id(&document.name, page.number, cursor, &text),
                document_name: document.name.clone(),
                page: page.number,
                offset,
                chunk_index: cursor,
                text,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn next_char_boundary(text: &str, from: usize) -> usize {
    text[from..]
        .chars()
        .next()
        .map(|ch| from + ch.len_utf8())
        .unwrap_or(text.len())
}

fn make_chunk_id(document_name: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_name.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
