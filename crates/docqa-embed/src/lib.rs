//! Embedding gateways that run in-process.
//!
//! Remote backends live outside this workspace; anything implementing
//! [`EmbeddingGateway`] plugs into the pipeline. [`HashEmbedder`] gives fast,
//! deterministic vectors for tests and offline use, and [`CachingEmbedder`]
//! keeps a bounded LRU of any gateway's vectors by content hash.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::info;

use docqa_core::config::EmbeddingSettings;
use docqa_core::error::{Error, Result};
use docqa_core::traits::EmbeddingGateway;

pub mod cache;
pub mod hash;

pub use cache::CachingEmbedder;
pub use hash::HashEmbedder;

/// Build the embedder named by `embedding.provider`, behind an LRU cache of
/// `embedding.cache_capacity` entries when that is non-zero.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingGateway>> {
    let embedder = match settings.provider.as_str() {
        "hash" => HashEmbedder::new(settings.dim),
        other => {
            return Err(Error::InvalidConfig(format!(
                "unknown embedding provider '{other}'; \
                 remote providers are wired in by the host application"
            )))
        }
    };
    info!(provider = %settings.provider, dim = settings.dim, "using hashing embedder");
    let gateway: Arc<dyn EmbeddingGateway> = match NonZeroUsize::new(settings.cache_capacity) {
        Some(capacity) => {
            info!(capacity = capacity.get(), "caching embeddings");
            Arc::new(CachingEmbedder::new(embedder, capacity))
        }
        None => Arc::new(embedder),
    };
    Ok(gateway)
}

/// Reject a vector whose length differs from what the gateway declared.
pub fn ensure_dim(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(Error::Gateway(format!(
            "embedding gateway returned {} dimensions, expected {expected}",
            vector.len()
        )))
    }
}
