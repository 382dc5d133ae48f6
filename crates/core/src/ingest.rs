use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::PdfExtractor;
use crate::models::{DocumentChunk, DocumentFingerprint};
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// File stem of `path`; indices are keyed by it.
pub fn document_name(path: &Path) -> Result<String, IngestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

pub fn fingerprint_document(path: &Path) -> Result<DocumentFingerprint, IngestError> {
    let checksum = digest_file(path)?;

    Ok(DocumentFingerprint {
        name: document_name(path)?,
        source_path: path.to_string_lossy().to_string(),
        checksum,
        ingested_at: Utc::now(),
    })
}

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<DocumentChunk>,
}

pub fn ingest_document(
    path: &Path,
    extractor: &dyn PdfExtractor,
    config: ChunkingConfig,
) -> Result<IngestedDocument, IngestError> {
    let fingerprint = fingerprint_document(path)?;
    let pages = extractor.extract_pages(path)?;
    let chunks = build_chunks(&fingerprint, &pages, config)?;

    if chunks.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "document produced no chunks: {}",
            path.display()
        )));
    }

    Ok(IngestedDocument {
        fingerprint,
        chunks,
    })
}
