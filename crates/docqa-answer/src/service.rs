use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, instrument};

use docqa_core::config::{RagSettings, Settings};
use docqa_core::error::{Error, Result};
use docqa_core::registry::ChunkerRegistry;
use docqa_core::traits::{EmbeddingGateway, GenerationGateway, VectorStore};
use docqa_core::types::{
    Answer, DeleteReport, DocumentSummary, Fragment, IngestReport, Query, SimilarityResult,
};

use crate::cancel::CancellationListener;
use crate::ingest::Ingestor;
use crate::prompt::{build_prompt, estimate_tokens};
use crate::retriever::Retriever;

/// Successful outcome of the answer pipeline before it is packaged.
struct Composed {
    text: String,
    sources: Vec<SimilarityResult>,
    token_estimate: usize,
}

/// Question answering over an injected store and gateways.
///
/// `ask` never fails: every error inside the pipeline becomes an [`Answer`]
/// with `succeeded == false`. Ingestion and deletion propagate their errors.
pub struct RagService {
    ingestor: Ingestor,
    retriever: Retriever,
    generator: Arc<dyn GenerationGateway>,
    store: Arc<dyn VectorStore>,
    settings: RagSettings,
}

impl RagService {
    pub fn new(
        embedder: Arc<dyn EmbeddingGateway>,
        generator: Arc<dyn GenerationGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            ingestor: Ingestor::new(Arc::clone(&embedder), Arc::clone(&store)),
            retriever: Retriever::new(embedder, Arc::clone(&store)),
            generator,
            store,
            settings: RagSettings::default(),
        }
    }

    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingGateway>,
        generator: Arc<dyn GenerationGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let ingestor = Ingestor::from_settings(settings, Arc::clone(&embedder), Arc::clone(&store));
        Self::new(embedder, generator, store)
            .with_ingestor(ingestor)
            .with_rag_settings(settings.rag.clone())
    }

    pub fn with_rag_settings(mut self, settings: RagSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_registry(mut self, registry: ChunkerRegistry) -> Self {
        self.ingestor = self.ingestor.with_registry(registry);
        self
    }

    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.ingestor = self.ingestor.with_rollback(enabled);
        self
    }

    fn with_ingestor(mut self, ingestor: Ingestor) -> Self {
        self.ingestor = ingestor;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub async fn ingest<R: Read>(
        &self,
        document_id: &str,
        reader: R,
        file_name: &str,
    ) -> Result<IngestReport> {
        self.ingestor.ingest(document_id, reader, file_name).await
    }

    pub fn delete_document(&self, document_id: &str) -> Result<DeleteReport> {
        if document_id.trim().is_empty() {
            return Err(Error::Validation("Document id cannot be empty".to_string()));
        }
        let deleted_count = self.store.delete_by_document(document_id)?;
        info!(document_id, deleted_count, "deleted document");
        Ok(DeleteReport { document_id: document_id.to_string(), deleted_count })
    }

    pub fn supported_formats(&self) -> Vec<String> {
        self.ingestor.supported_formats()
    }

    /// Every indexed document, in the order it was first stored.
    pub fn documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.documents()
    }

    /// Stored fragments of one document in sequence order.
    pub fn inspect_document(&self, document_id: &str) -> Result<Vec<Fragment>> {
        if document_id.trim().is_empty() {
            return Err(Error::Validation("Document id cannot be empty".to_string()));
        }
        let fragments = self.store.document_fragments(document_id)?;
        if fragments.is_empty() {
            return Err(Error::NotFound(format!("document {document_id}")));
        }
        Ok(fragments)
    }

    /// Answer `query` from the indexed corpus, or explain why not.
    #[instrument(skip_all, fields(session_id = %query.session_id))]
    pub async fn ask(&self, query: Query, cancel: &CancellationListener) -> Answer {
        let started = Instant::now();
        info!(question = %query.question, "processing question");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            composed = self.compose(&query) => composed,
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(composed) => {
                info!(
                    sources = composed.sources.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "answered question"
                );
                Answer {
                    text: composed.text,
                    sources: composed.sources,
                    session_id: query.session_id,
                    succeeded: true,
                    error_detail: None,
                    elapsed,
                    token_estimate: composed.token_estimate,
                }
            }
            Err(err) => {
                error!(error = %err, question = %query.question, "failed to answer question");
                Answer {
                    text: self.settings.error_message.clone(),
                    sources: Vec::new(),
                    session_id: query.session_id,
                    succeeded: false,
                    error_detail: Some(err.detail()),
                    elapsed,
                    token_estimate: 0,
                }
            }
        }
    }

    /// Prompt the generator with `sources` and return its text verbatim.
    pub async fn generate_answer(
        &self,
        question: &str,
        sources: &[SimilarityResult],
        cancel: &CancellationListener,
    ) -> Result<String> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            text = self.generate(question, sources) => text,
        }
    }

    async fn compose(&self, query: &Query) -> Result<Composed> {
        let sources = self
            .retriever
            .retrieve(&query.question, query.max_sources, query.min_score)
            .await?;
        info!(count = sources.len(), min_score = query.min_score, "found relevant sources");
        if sources.is_empty() {
            return Ok(Composed {
                text: self.settings.no_results_message.clone(),
                sources,
                token_estimate: 0,
            });
        }
        let text = self.generate(&query.question, &sources).await?;
        let token_estimate = estimate_tokens(&query.question, &text, &sources);
        Ok(Composed { text, sources, token_estimate })
    }

    async fn generate(&self, question: &str, sources: &[SimilarityResult]) -> Result<String> {
        let prompt = build_prompt(question, sources);
        debug!(
            generator = self.generator.name(),
            prompt_chars = prompt.len(),
            "requesting completion"
        );
        self.generator.complete(&prompt).await
    }
}
