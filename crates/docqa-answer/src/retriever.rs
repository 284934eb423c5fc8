use std::sync::Arc;

use tracing::debug;

use docqa_core::error::Result;
use docqa_core::traits::{EmbeddingGateway, VectorStore};
use docqa_core::types::SimilarityResult;
use docqa_embed::ensure_dim;

/// Embeds a question, searches the store and keeps the hits at or above the
/// score threshold.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingGateway>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn retrieve(
        &self,
        question: &str,
        max_sources: usize,
        min_score: f32,
    ) -> Result<Vec<SimilarityResult>> {
        let embedding = self.embedder.embed(question).await?;
        ensure_dim(&embedding, self.embedder.dim())?;
        self.search(&embedding, max_sources, min_score)
    }

    /// Same as [`retrieve`](Self::retrieve) for an already embedded query.
    pub fn search(
        &self,
        embedding: &[f32],
        max_sources: usize,
        min_score: f32,
    ) -> Result<Vec<SimilarityResult>> {
        let hits = self.store.search(embedding, max_sources)?;
        let candidates = hits.len();
        let kept = filter_by_score(hits, min_score);
        debug!(candidates, kept = kept.len(), min_score, "retrieved sources");
        Ok(kept)
    }
}

/// Keep hits with `score >= min_score`, preserving their order.
pub fn filter_by_score(hits: Vec<SimilarityResult>, min_score: f32) -> Vec<SimilarityResult> {
    hits.into_iter().filter(|h| h.score >= min_score).collect()
}
