use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use docqa_core::error::{Error, Result};
use docqa_core::traits::VectorStore;
use docqa_core::types::{
    preview, DocumentSummary, Fragment, Metadata, SimilarityResult, PREVIEW_CHARS,
};

use crate::similarity::score;

/// What a search does with a stored vector whose length differs from the
/// query's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Log it and score the record 0.
    #[default]
    ZeroScore,
    /// Fail the whole search with `DimensionMismatch`.
    Reject,
}

impl MismatchPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Reject
        } else {
            Self::ZeroScore
        }
    }
}

/// What one change did to [`Records`], enough to put them back.
#[derive(Debug, Default)]
pub(crate) struct Undo {
    dimension: Option<Option<usize>>,
    /// Original positions, ascending.
    removed: Vec<(usize, Fragment)>,
    /// Positions after removal, in the order the overwrites happened.
    replaced: Vec<(usize, Fragment)>,
    appended: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Records {
    fragments: Vec<Fragment>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl Records {
    pub(crate) fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub(crate) fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Validate a batch against the store without touching it. Returns the
    /// dimension the store will have afterwards.
    fn check(&self, fragments: &[Fragment]) -> Result<Option<usize>> {
        let mut dimension = self.dimension;
        for fragment in fragments {
            validate_embedding(&fragment.embedding, "stored")?;
            let dim = fragment.dim();
            match dimension {
                Some(expected) if expected != dim => {
                    return Err(Error::DimensionMismatch { expected, actual: dim });
                }
                Some(_) => {}
                None => dimension = Some(dim),
            }
        }
        Ok(dimension)
    }

    fn upsert_all(&mut self, fragments: Vec<Fragment>, dimension: Option<usize>, undo: &mut Undo) {
        if dimension != self.dimension {
            undo.dimension = Some(self.dimension);
            self.dimension = dimension;
        }
        for fragment in fragments {
            match self.positions.get(&fragment.id) {
                Some(&at) => {
                    let old = std::mem::replace(&mut self.fragments[at], fragment);
                    undo.replaced.push((at, old));
                }
                None => {
                    self.positions.insert(fragment.id.clone(), self.fragments.len());
                    self.fragments.push(fragment);
                    undo.appended += 1;
                }
            }
        }
    }

    fn remove_where(&mut self, doomed: impl Fn(&Fragment) -> bool, undo: &mut Undo) -> usize {
        if !self.fragments.iter().any(&doomed) {
            return 0;
        }
        let mut kept = Vec::with_capacity(self.fragments.len());
        for (at, fragment) in std::mem::take(&mut self.fragments).into_iter().enumerate() {
            if doomed(&fragment) {
                undo.removed.push((at, fragment));
            } else {
                kept.push(fragment);
            }
        }
        self.fragments = kept;
        self.reindex();
        undo.removed.len()
    }

    pub(crate) fn put_all(&mut self, fragments: Vec<Fragment>) -> Result<Undo> {
        let dimension = self.check(&fragments)?;
        let mut undo = Undo::default();
        self.upsert_all(fragments, dimension, &mut undo);
        Ok(undo)
    }

    pub(crate) fn replace_document(
        &mut self,
        document_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<(usize, Undo)> {
        if let Some(stray) = fragments.iter().find(|f| f.document_id != document_id) {
            return Err(Error::Validation(format!(
                "fragment {} belongs to {}, not {document_id}",
                stray.id, stray.document_id
            )));
        }
        let dimension = self.check(&fragments)?;
        let incoming: HashSet<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
        let mut undo = Undo::default();
        let removed = self.remove_where(
            |f| f.document_id == document_id && !incoming.contains(f.id.as_str()),
            &mut undo,
        );
        self.upsert_all(fragments, dimension, &mut undo);
        Ok((removed, undo))
    }

    pub(crate) fn remove_document(&mut self, document_id: &str) -> (usize, Undo) {
        let mut undo = Undo::default();
        let removed = self.remove_where(|f| f.document_id == document_id, &mut undo);
        (removed, undo)
    }

    pub(crate) fn undo(&mut self, undo: Undo) {
        let base = self.fragments.len() - undo.appended;
        self.fragments.truncate(base);
        for (at, old) in undo.replaced.into_iter().rev() {
            if at < base {
                self.fragments[at] = old;
            }
        }
        for (at, fragment) in undo.removed {
            self.fragments.insert(at, fragment);
        }
        if let Some(dimension) = undo.dimension {
            self.dimension = dimension;
        }
        self.reindex();
    }

    fn document_fragments(&self, document_id: &str) -> Vec<Fragment> {
        let mut out: Vec<Fragment> = self
            .fragments
            .iter()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|f| f.sequence);
        out
    }

    fn summaries(&self) -> Vec<DocumentSummary> {
        let mut order: Vec<(&Fragment, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for fragment in &self.fragments {
            match index.get(fragment.document_id.as_str()) {
                Some(&at) => {
                    let (first, count) = &mut order[at];
                    *count += 1;
                    if fragment.sequence < first.sequence {
                        *first = fragment;
                    }
                }
                None => {
                    index.insert(&fragment.document_id, order.len());
                    order.push((fragment, 1));
                }
            }
        }
        order
            .into_iter()
            .map(|(first, fragment_count)| DocumentSummary {
                document_id: first.document_id.clone(),
                file_name: first.file_name().map(str::to_string),
                fragment_count,
                preview: preview(&first.content, PREVIEW_CHARS),
            })
            .collect()
    }

    fn reindex(&mut self) {
        self.positions = self
            .fragments
            .iter()
            .enumerate()
            .map(|(at, f)| (f.id.clone(), at))
            .collect();
    }
}

fn validate_embedding(embedding: &[f32], what: &str) -> Result<()> {
    if embedding.is_empty() {
        return Err(Error::Validation(format!("{what} embedding is empty")));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation(format!("{what} embedding contains non-finite values")));
    }
    Ok(())
}

fn poisoned() -> Error {
    Error::Store("vector store lock poisoned".to_string())
}

/// Exact-search store held entirely in memory.
///
/// Records keep insertion order; re-inserting a fragment id replaces the
/// record in place. Searches and mutations are serialized by one `RwLock`,
/// so a search sees a document either fully present or fully deleted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    policy: MismatchPolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the embedding dimension before the first insert.
    pub fn with_dimension(dimension: usize) -> Self {
        let records = Records { dimension: Some(dimension), ..Records::default() };
        Self { records: RwLock::new(records), policy: MismatchPolicy::default() }
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MismatchPolicy {
        self.policy
    }

    /// Number of distinct documents with at least one fragment.
    pub fn document_count(&self) -> usize {
        self.read_or_warn("document_count")
            .map(|r| {
                r.fragments.iter().map(|f| f.document_id.as_str()).collect::<HashSet<_>>().len()
            })
            .unwrap_or(0)
    }

    /// All fragments in insertion order.
    pub fn fragments(&self) -> Result<Vec<Fragment>> {
        Ok(self.read()?.fragments.clone())
    }

    /// Run one change under the write lock, handing back what it did so the
    /// caller can [`revert`](Self::revert) it.
    pub(crate) fn apply<T>(
        &self,
        change: impl FnOnce(&mut Records) -> Result<(T, Undo)>,
    ) -> Result<(T, Undo)> {
        change(&mut *self.write()?)
    }

    pub(crate) fn revert(&self, undo: Undo) -> Result<()> {
        self.write()?.undo(undo);
        Ok(())
    }

    pub(crate) fn with_records<T>(&self, f: impl FnOnce(&Records) -> T) -> Result<T> {
        Ok(f(&*self.read()?))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records.write().map_err(|_| poisoned())
    }

    /// Read access for the infallible accessors; a poisoned lock is logged
    /// and reported as `None`.
    fn read_or_warn(&self, accessor: &str) -> Option<RwLockReadGuard<'_, Records>> {
        match self.records.read() {
            Ok(records) => Some(records),
            Err(_) => {
                warn!(accessor, "vector store lock poisoned, reporting an empty store");
                None
            }
        }
    }
}

impl VectorStore for MemoryStore {
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
        let count = fragments.len();
        self.apply(|records| Ok(((), records.put_all(fragments)?)))?;
        debug!(count, "inserted fragments");
        Ok(())
    }

    fn replace_document(&self, document_id: &str, fragments: Vec<Fragment>) -> Result<usize> {
        let count = fragments.len();
        let (removed, _) = self.apply(|records| records.replace_document(document_id, fragments))?;
        debug!(document_id, count, removed, "replaced document fragments");
        Ok(removed)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>> {
        if query.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(
                "query embedding contains non-finite values".to_string(),
            ));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let records = self.read()?;
        let mut mismatched = 0usize;
        let mut scored = Vec::with_capacity(records.fragments.len());
        for fragment in &records.fragments {
            let similarity = match score(query, &fragment.embedding) {
                Ok(s) => s,
                Err(err) if self.policy == MismatchPolicy::Reject => return Err(err),
                Err(_) => {
                    mismatched += 1;
                    0.0
                }
            };
            scored.push((similarity, fragment));
        }
        if mismatched > 0 {
            warn!(
                mismatched,
                query_dim = query.len(),
                store_dim = ?records.dimension,
                "scored records with mismatched dimension as 0"
            );
        }

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let results: Vec<SimilarityResult> = scored
            .into_iter()
            .take(top_k)
            .map(|(s, fragment)| fragment.with_score(s))
            .collect();
        debug!(candidates = records.fragments.len(), returned = results.len(), "vector search");
        Ok(results)
    }

    fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let (removed, _) = self.apply(|records| Ok(records.remove_document(document_id)))?;
        debug!(document_id, removed, "deleted document fragments");
        Ok(removed)
    }

    fn document_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        Ok(self.read()?.document_fragments(document_id))
    }

    fn documents(&self) -> Result<Vec<DocumentSummary>> {
        Ok(self.read()?.summaries())
    }

    fn len(&self) -> usize {
        self.read_or_warn("len").map(|r| r.fragments.len()).unwrap_or(0)
    }

    fn dimension(&self) -> Option<usize> {
        self.read_or_warn("dimension").and_then(|r| r.dimension)
    }
}
