use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use docqa_core::error::{Error, Result};
use docqa_core::traits::VectorStore;
use docqa_core::types::{DocumentSummary, Fragment, Metadata, SimilarityResult};

use crate::memory::{MemoryStore, MismatchPolicy, Records, Undo};
use crate::schema::{write_snapshot, Snapshot};

/// [`MemoryStore`] persisted to a JSON snapshot after every mutation.
///
/// The snapshot is written to a temporary file in the same directory and
/// renamed over the old one. If that fails the in-memory change is undone
/// and the caller gets `Error::Store`. A batch insert or a document
/// replacement is one mutation and one write.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    writer: Mutex<()>,
}

impl FileStore {
    /// Open the snapshot at `path`, or start empty when it does not exist.
    pub fn open(
        path: impl Into<PathBuf>,
        dimension: Option<usize>,
        policy: MismatchPolicy,
    ) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let snapshot: Snapshot = serde_json::from_slice(&fs::read(&path)?)?;
            snapshot.check_version()?;
            if let (Some(configured), Some(stored)) = (dimension, snapshot.dimension) {
                if configured != stored {
                    return Err(Error::DimensionMismatch { expected: configured, actual: stored });
                }
            }
            Some(snapshot)
        } else {
            debug!(path = %path.display(), "no snapshot yet, starting empty");
            None
        };

        let fixed = dimension.or_else(|| snapshot.as_ref().and_then(|s| s.dimension));
        let inner = match fixed {
            Some(dim) => MemoryStore::with_dimension(dim),
            None => MemoryStore::new(),
        }
        .with_policy(policy);

        if let Some(snapshot) = snapshot {
            let fragments = snapshot
                .records
                .into_iter()
                .map(|record| record.into_fragment())
                .collect::<Result<Vec<_>>>()?;
            let count = fragments.len();
            let _ = inner.apply(|records| Ok(((), records.put_all(fragments)?)))?;
            info!(path = %path.display(), fragments = count, "loaded vector store snapshot");
        }
        Ok(Self { path, inner, writer: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document_count(&self) -> usize {
        self.inner.document_count()
    }

    pub fn fragments(&self) -> Result<Vec<Fragment>> {
        self.inner.fragments()
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| Error::Store("file store writer lock poisoned".to_string()))
    }

    /// Apply `change` to the in-memory records, then persist; undo just that
    /// change on a failed write.
    fn mutate<T>(&self, change: impl FnOnce(&mut Records) -> Result<(T, Undo)>) -> Result<T> {
        let _guard = self.lock_writer()?;
        let (out, undo) = self.inner.apply(change)?;
        if let Err(err) = self.persist() {
            warn!(path = %self.path.display(), error = %err, "snapshot write failed, rolling back");
            self.inner.revert(undo)?;
            return Err(Error::Store(format!(
                "failed to write {}: {}",
                self.path.display(),
                err.detail()
            )));
        }
        Ok(out)
    }

    fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.inner.with_records(|records| {
                write_snapshot(&mut writer, records.dimension(), records.fragments())
            })??;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl VectorStore for FileStore {
    fn insert(
        &self,
        document_id: &str,
        fragment_id: &str,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Result<()> {
        let fragment = Fragment::from_parts(document_id, fragment_id, embedding, metadata);
        self.insert_batch(vec![fragment])
    }

    fn insert_batch(&self, fragments: Vec<Fragment>) -> Result<()> {
        self.mutate(|records| Ok(((), records.put_all(fragments)?)))
    }

    fn replace_document(&self, document_id: &str, fragments: Vec<Fragment>) -> Result<usize> {
        let removed = self.mutate(|records| records.replace_document(document_id, fragments))?;
        debug!(document_id, removed, path = %self.path.display(), "replaced document fragments");
        Ok(removed)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>> {
        self.inner.search(query, top_k)
    }

    fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        self.mutate(|records| Ok(records.remove_document(document_id)))
    }

    fn document_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        self.inner.document_fragments(document_id)
    }

    fn documents(&self) -> Result<Vec<DocumentSummary>> {
        self.inner.documents()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }
}
