//! Bounded embedding cache keyed by the blake3 hash of the input text.
//!
//! Consulted before calling the wrapped gateway and written through on a
//! miss. Holds at most `capacity` vectors and evicts the least recently used
//! one when full.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lru::LruCache;
use tracing::{trace, warn};

use docqa_core::error::Result;
use docqa_core::traits::EmbeddingGateway;

fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

pub struct CachingEmbedder<G> {
    inner: G,
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl<G: EmbeddingGateway> CachingEmbedder<G> {
    pub fn new(inner: G, capacity: NonZeroUsize) -> Self {
        Self { inner, entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn capacity(&self) -> usize {
        self.lock().map(|c| c.cap().get()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A poisoned cache is logged and bypassed.
    fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, Vec<f32>>>> {
        match self.entries.lock() {
            Ok(entries) => Some(entries),
            Err(_) => {
                warn!("embedding cache lock poisoned, bypassing cache");
                None
            }
        }
    }
}

#[async_trait]
impl<G: EmbeddingGateway> EmbeddingGateway for CachingEmbedder<G> {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_content(text);
        if let Some(hit) = self.lock().and_then(|mut c| c.get(&key).cloned()) {
            trace!(key = %key, "embedding cache hit");
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        if let Some(mut entries) = self.lock() {
            entries.put(key, vector.clone());
        }
        Ok(vector)
    }
}
