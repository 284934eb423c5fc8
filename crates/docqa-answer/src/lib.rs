//! Retrieval and answer composition on top of the chunker, the embedding
//! gateway and the vector store.

pub mod cancel;
pub mod ingest;
pub mod prompt;
pub mod retriever;
pub mod service;

pub use cancel::{cancellation, CancellationHandle, CancellationListener};
pub use ingest::Ingestor;
pub use retriever::Retriever;
pub use service::RagService;
