use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DocumentChunk, DocumentSummary, Fragment, Metadata, SimilarityResult};

/// Text to fixed-dimension vector. Failures are reported as
/// [`Error::Gateway`](crate::error::Error::Gateway).
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Dimension of every vector this gateway returns.
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Prompt to completion text.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Holder of embedded fragments with exact similarity search.
///
/// Implementations are shared between concurrent callers, so every method
/// takes `&self` and synchronizes internally. A single `search` must observe
/// either all or none of a concurrent `delete_by_document`.
pub trait VectorStore: Send + Sync {
    /// Insert or replace the fragment `fragment_id`. Content and sequence are
    /// read from `metadata["content"]` and `metadata["chunkIndex"]`.
    fn insert(
        &self,
        document_id: &str,
        fragment_id: &str,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Result<()>;

    /// Insert or replace every fragment in one step: either all of them are
    /// stored or none is.
    fn insert_batch(&self, fragments: Vec<Fragment>) -> Result<()>;

    /// Make `fragments` the complete content of `document_id`: upsert them and
    /// remove the document's other fragments, all or nothing. Returns how many
    /// stale fragments were removed.
    fn replace_document(&self, document_id: &str, fragments: Vec<Fragment>) -> Result<usize>;

    /// Top `top_k` fragments by cosine similarity, highest first.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>>;

    /// Remove every fragment of `document_id`, returning how many went away.
    fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Fragments of `document_id` ordered by sequence.
    fn document_fragments(&self, document_id: &str) -> Result<Vec<Fragment>>;

    /// One summary per stored document, in order of first insertion.
    fn documents(&self) -> Result<Vec<DocumentSummary>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension fixed for this store, if known yet.
    fn dimension(&self) -> Option<usize>;
}

/// A chunking strategy for one family of file formats.
pub trait ChunkStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `extension` includes the leading dot, e.g. `.txt`.
    fn can_handle(&self, extension: &str) -> bool;

    /// Extensions this strategy accepts, for listing supported formats.
    fn extensions(&self) -> Vec<String>;

    fn chunk(
        &self,
        document_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Vec<DocumentChunk>>;
}
