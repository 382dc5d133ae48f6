use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::index::VectorIndex;
use crate::ingest::{digest_file, document_name, ingest_document};
use crate::traits::IndexStore;
use crate::IndexError;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Built,
}

#[derive(Debug, Clone)]
pub struct CachedIndex {
    pub index: VectorIndex,
    pub outcome: CacheOutcome,
}

/// Build-if-absent cache of one vector index per document name.
///
/// Cached indices are never invalidated implicitly. When the source file is
/// still readable its checksum is compared with the one recorded at build
/// time and a mismatch is logged, but the cached index is still served;
/// [`IndexCache::invalidate`] is the only way to force a rebuild.
pub struct IndexCache<S> {
    store: S,
    chunking: ChunkingConfig,
}

impl<S: IndexStore> IndexCache<S> {
    pub fn new(store: S, chunking: ChunkingConfig) -> Self {
        Self { store, chunking }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn load_or_build(
        &self,
        document_path: &Path,
        extractor: &dyn PdfExtractor,
        embedder: &dyn Embedder,
    ) -> Result<CachedIndex, IndexError> {
        let name = document_name(document_path)?;

        if let Some(index) = self.store.load(&name).await? {
            info!(document = %name, chunks = index.len(), "index cache hit");
            warn_if_stale(&index, document_path);
            return Ok(CachedIndex {
                index,
                outcome: CacheOutcome::Hit,
            });
        }

        info!(document = %name, path = %document_path.display(), "building index");
        let document = ingest_document(document_path, extractor, self.chunking)?;
        let texts = document
            .chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let embeddings = embedder.embed_documents(&texts).await?;

        let index = VectorIndex::build(
            document.fingerprint,
            embedder.model_name(),
            document.chunks,
            embeddings,
        )?;
        self.store.save(&index).await?;

        info!(document = %name, chunks = index.len(), dimensions = index.dimensions, "index built");
        Ok(CachedIndex {
            index,
            outcome: CacheOutcome::Built,
        })
    }

    pub async fn invalidate(&self, name: &str) -> Result<(), IndexError> {
        if self.store.remove(name).await? {
            info!(document = %name, "index invalidated");
            Ok(())
        } else {
            Err(IndexError::NotFound(name.to_string()))
        }
    }
}

fn warn_if_stale(index: &VectorIndex, document_path: &Path) {
    if !document_path.is_file() {
        return;
    }

    match digest_file(document_path) {
        Ok(checksum) if checksum != index.fingerprint.checksum => warn!(
            document = %index.name(),
            built_at = %index.fingerprint.ingested_at.to_rfc3339(),
            "source pdf changed since the index was built; serving cached index"
        ),
        Ok(_) => {}
        Err(error) => warn!(document = %index.name(), error = %error, "could not checksum source pdf"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::PageText;
    use crate::stores::MemoryIndexStore;
    use crate::IngestError;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingExtractor {
        calls: AtomicUsize,
    }

    impl PdfExtractor for CountingExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PageText {
                number: 1,
                text: "Plazo de ejecución: doce meses.".to_string(),
            }])
        }
    }

    struct FailingExtractor;

    impl PdfExtractor for FailingExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::PdfParse(format!("cannot read {}", path.display())))
        }
    }

    #[tokio::test]
    async fn second_load_is_a_cache_hit() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("document_799.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let cache = IndexCache::new(MemoryIndexStore::new(), ChunkingConfig::default());
        let extractor = CountingExtractor::default();
        let embedder = CharacterNgramEmbedder::default();

        let first = cache.load_or_build(&path, &extractor, &embedder).await?;
        let second = cache.load_or_build(&path, &extractor, &embedder).await?;

        assert_eq!(first.outcome, CacheOutcome::Built);
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.index, second.index);
        assert_eq!(second.index.name(), "document_799");
        Ok(())
    }

    #[tokio::test]
    async fn cached_index_is_served_without_the_source_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("pliego.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let cache = IndexCache::new(MemoryIndexStore::new(), ChunkingConfig::default());
        let embedder = CharacterNgramEmbedder::default();
        cache
            .load_or_build(&path, &CountingExtractor::default(), &embedder)
            .await?;
        fs::remove_file(&path)?;

        let cached = cache.load_or_build(&path, &FailingExtractor, &embedder).await?;
        assert_eq!(cached.outcome, CacheOutcome::Hit);
        Ok(())
    }

    #[tokio::test]
    async fn changed_source_still_serves_cached_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("document_799.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let cache = IndexCache::new(MemoryIndexStore::new(), ChunkingConfig::default());
        let extractor = CountingExtractor::default();
        let embedder = CharacterNgramEmbedder::default();

        let first = cache.load_or_build(&path, &extractor, &embedder).await?;
        fs::write(&path, b"%PDF-1.4\n%changed")?;
        assert_ne!(digest_file(&path)?, first.index.fingerprint.checksum);

        let second = cache.load_or_build(&path, &extractor, &embedder).await?;
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(second.index, first.index);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn loader_failures_propagate() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let cache = IndexCache::new(MemoryIndexStore::new(), ChunkingConfig::default());
        let result = cache
            .load_or_build(&path, &FailingExtractor, &CharacterNgramEmbedder::default())
            .await;

        assert!(matches!(result, Err(IndexError::Ingest(IngestError::PdfParse(_)))));
        assert!(!cache.store().contains("broken").await?);
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_forces_a_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let cache = IndexCache::new(MemoryIndexStore::new(), ChunkingConfig::default());
        let extractor = CountingExtractor::default();
        let embedder = CharacterNgramEmbedder::default();

        cache.load_or_build(&path, &extractor, &embedder).await?;
        cache.invalidate("doc").await?;
        let rebuilt = cache.load_or_build(&path, &extractor, &embedder).await?;

        assert_eq!(rebuilt.outcome, CacheOutcome::Built);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            cache.invalidate("missing").await,
            Err(IndexError::NotFound(_))
        ));
        Ok(())
    }
}
