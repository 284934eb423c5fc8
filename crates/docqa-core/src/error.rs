use std::fmt;

use thiserror::Error;

/// Pipeline stage an ingestion failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Reading,
    Chunking,
    Embedding,
    Storing,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reading => "reading",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ingestion failed while {stage}{}: {source}", sequence_suffix(.sequence))]
    Ingestion {
        stage: IngestStage,
        sequence: Option<usize>,
        #[source]
        source: Box<Error>,
    },
}

fn sequence_suffix(sequence: &Option<usize>) -> String {
    sequence.map(|s| format!(" fragment {s}")).unwrap_or_default()
}

impl Error {
    /// Wrap `self` as a failure of the given ingestion stage.
    pub fn at_stage(self, stage: IngestStage, sequence: Option<usize>) -> Self {
        Self::Ingestion { stage, sequence, source: Box::new(self) }
    }

    /// The bare failure message, without the variant prefix.
    ///
    /// Gateways report their own message verbatim so callers can show it as
    /// diagnostic detail.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::UnsupportedFormat(msg)
            | Self::Gateway(msg)
            | Self::Store(msg)
            | Self::NotFound(msg)
            | Self::InvalidConfig(msg) => msg.clone(),
            Self::Cancelled => "operation cancelled".to_string(),
            Self::Ingestion { source, .. } => source.detail(),
            other => other.to_string(),
        }
    }

    /// The stage of a failed ingestion, if this error came from one.
    pub fn stage(&self) -> Option<IngestStage> {
        match self {
            Self::Ingestion { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
