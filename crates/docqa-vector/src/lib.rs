//! Exact cosine-similarity vector stores.
//!
//! [`MemoryStore`] keeps everything in process; [`FileStore`] adds a JSON
//! snapshot on disk. Both implement [`docqa_core::traits::VectorStore`].

pub mod file;
pub mod memory;
pub mod schema;
pub mod similarity;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use docqa_core::config::{resolve_with_base, StoreKind, StoreSettings};
use docqa_core::error::{Error, Result};
use docqa_core::traits::VectorStore;

pub use file::FileStore;
pub use memory::{MemoryStore, MismatchPolicy};
pub use similarity::cosine_similarity;

/// Build the store described by `settings`. A relative `store.path` is
/// resolved against `base`.
pub fn store_from_settings(settings: &StoreSettings, base: &Path) -> Result<Arc<dyn VectorStore>> {
    let policy = MismatchPolicy::from_strict(settings.strict_dimensions);
    match settings.kind {
        StoreKind::Memory => {
            let store = match settings.dimension {
                Some(dim) => MemoryStore::with_dimension(dim),
                None => MemoryStore::new(),
            };
            info!(?policy, "using in-memory vector store");
            Ok(Arc::new(store.with_policy(policy)))
        }
        StoreKind::File => {
            let raw = settings.path.as_deref().ok_or_else(|| {
                Error::InvalidConfig("store.path is required for the file store".into())
            })?;
            let path = resolve_with_base(base, raw);
            info!(path = %path.display(), ?policy, "using file-backed vector store");
            Ok(Arc::new(FileStore::open(path, settings.dimension, policy)?))
        }
    }
}
