//! Domain types shared by the chunker, the vector store and the answer
//! pipeline.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type FragmentId = String;

/// Free-form fragment metadata: string keys mapped to scalar or string values.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Well-known metadata keys written during ingestion.
pub mod meta_keys {
    pub const FILE_NAME: &str = "fileName";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const PAGE_NUMBER: &str = "pageNumber";
    pub const CONTENT: &str = "content";
    pub const SOURCE: &str = "source";
}

pub const DEFAULT_MAX_SOURCES: usize = 5;
pub const PREVIEW_CHARS: usize = 100;
pub const DEFAULT_MIN_SCORE: f32 = 0.7;

/// A chunk of a source document produced by a chunking strategy, before it
/// has been embedded.
///
/// - `id`: `<document_id>:<sequence>`
/// - `sequence`: zero-based position within the parent document
/// - `metadata`: file name, chunk index, page number (paged formats), the
///   content itself and the source tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: FragmentId,
    pub document_id: String,
    pub sequence: usize,
    pub content: String,
    pub metadata: Metadata,
}

impl DocumentChunk {
    pub fn fragment_id(document_id: &str, sequence: usize) -> FragmentId {
        format!("{document_id}:{sequence}")
    }
}

/// A stored, embedded unit of document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub document_id: String,
    pub sequence: usize,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Fragment {
    /// Build a record the way the store contract describes it: content and
    /// sequence are read from the metadata, missing values fall back to an
    /// empty string and zero.
    pub fn from_parts(
        document_id: &str,
        fragment_id: &str,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Self {
        let content = match metadata.get(meta_keys::CONTENT) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let sequence = metadata
            .get(meta_keys::CHUNK_INDEX)
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(0);
        Self {
            id: fragment_id.to_string(),
            document_id: document_id.to_string(),
            sequence,
            content,
            metadata,
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn from_chunk(chunk: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            sequence: chunk.sequence,
            content: chunk.content,
            metadata: chunk.metadata,
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn dim(&self) -> usize {
        self.embedding.len()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get(meta_keys::FILE_NAME).and_then(serde_json::Value::as_str)
    }

    pub fn with_score(&self, score: f32) -> SimilarityResult {
        SimilarityResult {
            fragment_id: self.id.clone(),
            document_id: self.document_id.clone(),
            sequence: self.sequence,
            content: self.content.clone(),
            metadata: self.metadata.clone(),
            score,
        }
    }
}

/// One stored document as listed by a store.
///
/// `preview` is the start of the document's lowest-sequence fragment, cut at
/// [`PREVIEW_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub file_name: Option<String>,
    pub fragment_count: usize,
    pub preview: String,
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Read-only projection of a fragment scored against a query embedding.
/// `score` is cosine similarity, higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub fragment_id: FragmentId,
    pub document_id: String,
    pub sequence: usize,
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// A question to answer from the indexed corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub question: String,
    pub session_id: String,
    pub max_sources: usize,
    pub min_score: f32,
    /// Pass-through constraints; not consulted by the similarity search.
    #[serde(default)]
    pub filter: Metadata,
}

impl Query {
    pub fn new(question: impl Into<String>) -> Result<Self> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(Error::Validation("Question cannot be empty".to_string()));
        }
        Ok(Self {
            question,
            session_id: String::new(),
            max_sources: DEFAULT_MAX_SOURCES,
            min_score: DEFAULT_MIN_SCORE,
            filter: Metadata::new(),
        })
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_max_sources(mut self, max_sources: usize) -> Result<Self> {
        if max_sources == 0 {
            return Err(Error::Validation("max_sources must be positive".to_string()));
        }
        self.max_sources = max_sources;
        Ok(self)
    }

    pub fn with_min_score(mut self, min_score: f32) -> Result<Self> {
        if !min_score.is_finite() {
            return Err(Error::Validation(format!("min_score must be finite, got {min_score}")));
        }
        self.min_score = min_score;
        Ok(self)
    }

    pub fn with_filter(mut self, filter: Metadata) -> Self {
        self.filter = filter;
        self
    }
}

/// The outcome of one question, successful or not.
///
/// `error_detail` is `Some` exactly when `succeeded` is false.
/// `token_estimate` is a four-characters-per-token approximation, not a
/// tokenizer count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SimilarityResult>,
    pub session_id: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub elapsed: Duration,
    pub token_estimate: usize,
}

/// Summary of one ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub file_name: String,
    pub chunks_stored: usize,
}

/// Summary of one deleted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub document_id: String,
    pub deleted_count: usize,
}
