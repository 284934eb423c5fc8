use std::io::Read;
use std::sync::Arc;

use tracing::{debug, info, warn};

use docqa_core::config::Settings;
use docqa_core::error::{Error, IngestStage, Result};
use docqa_core::registry::{file_extension, ChunkerRegistry};
use docqa_core::traits::{EmbeddingGateway, VectorStore};
use docqa_core::types::{DocumentChunk, Fragment, IngestReport};
use docqa_embed::ensure_dim;

/// Reads an upload, chunks it with the strategy registered for its
/// extension, embeds every fragment and stores the result as the document's
/// complete content in one store call.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    registry: ChunkerRegistry,
    rollback_on_failure: bool,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingGateway>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store, registry: ChunkerRegistry::default(), rollback_on_failure: false }
    }

    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(embedder, store)
            .with_registry(ChunkerRegistry::from_settings(&settings.chunking))
            .with_rollback(settings.ingest.rollback_on_failure)
    }

    pub fn with_registry(mut self, registry: ChunkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Discard everything embedded so far when a later fragment fails, so the
    /// previously stored version of the document stays untouched.
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.registry.supported_extensions()
    }

    pub async fn ingest<R: Read>(
        &self,
        document_id: &str,
        mut reader: R,
        file_name: &str,
    ) -> Result<IngestReport> {
        if document_id.trim().is_empty() {
            return Err(Error::Validation("Document id cannot be empty".to_string()));
        }
        let strategy = self
            .registry
            .for_file_name(file_name)
            .ok_or_else(|| Error::UnsupportedFormat(file_extension(file_name)))?;

        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| Error::from(e).at_stage(IngestStage::Reading, None))?;
        if bytes.is_empty() {
            return Err(Error::Validation(format!("{file_name} is empty")));
        }

        let chunks = strategy
            .chunk(document_id, file_name, &bytes)
            .map_err(|e| e.at_stage(IngestStage::Chunking, None))?;
        debug!(document_id, strategy = strategy.name(), chunks = chunks.len(), "chunked upload");

        let mut staged = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let sequence = chunk.sequence;
            match self.embed_chunk(chunk).await {
                Ok(fragment) => staged.push(fragment),
                Err(err) => {
                    let embedded = staged.len();
                    warn!(document_id, sequence, embedded, error = %err, "ingestion failed");
                    self.keep_partial(document_id, staged);
                    return Err(err);
                }
            }
        }

        let stored = staged.len();
        let replaced = self
            .store
            .replace_document(document_id, staged)
            .map_err(|e| e.at_stage(IngestStage::Storing, None))?;
        if replaced > 0 {
            debug!(document_id, replaced, "dropped fragments of the previous version");
        }

        info!(document_id, file_name, chunks_stored = stored, "ingested document");
        Ok(IngestReport {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            chunks_stored: stored,
        })
    }

    async fn embed_chunk(&self, chunk: DocumentChunk) -> Result<Fragment> {
        let sequence = Some(chunk.sequence);
        let embedding = self
            .embedder
            .embed(&chunk.content)
            .await
            .map_err(|e| e.at_stage(IngestStage::Embedding, sequence))?;
        ensure_dim(&embedding, self.embedder.dim())
            .map_err(|e| e.at_stage(IngestStage::Embedding, sequence))?;
        Ok(Fragment::from_chunk(chunk, embedding))
    }

    /// After a failed embedding, either discard what was embedded (rollback)
    /// or let it replace the stored document. A previous version is never
    /// mixed with the new one.
    fn keep_partial(&self, document_id: &str, staged: Vec<Fragment>) {
        if self.rollback_on_failure {
            info!(document_id, discarded = staged.len(), "rolled back partial ingestion");
            return;
        }
        if staged.is_empty() {
            return;
        }
        let kept = staged.len();
        match self.store.replace_document(document_id, staged) {
            Ok(_) => info!(document_id, kept, "stored partial document"),
            Err(err) => warn!(document_id, error = %err, "could not store partial document"),
        }
    }
}
