//! On-disk layout of the durable store: one record per fragment inside a
//! versioned JSON snapshot.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::ser::{Error as _, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use docqa_core::error::{Error, Result};
use docqa_core::types::{Fragment, Metadata};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_id: String,
    pub sequence_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Metadata serialized as a JSON object string.
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
}

impl FragmentRecord {
    pub fn from_fragment(fragment: &Fragment) -> Result<Self> {
        Ok(Self {
            id: fragment.id.clone(),
            document_id: fragment.document_id.clone(),
            chunk_id: fragment.id.clone(),
            sequence_index: fragment.sequence,
            content: fragment.content.clone(),
            embedding: fragment.embedding.clone(),
            metadata_json: serde_json::to_string(&fragment.metadata)?,
            created_at: fragment.created_at,
        })
    }

    pub fn into_fragment(self) -> Result<Fragment> {
        let metadata: Metadata = serde_json::from_str(&self.metadata_json)?;
        Ok(Fragment {
            id: self.chunk_id,
            document_id: self.document_id,
            sequence: self.sequence_index,
            content: self.content,
            metadata,
            embedding: self.embedding,
            created_at: self.created_at,
        })
    }
}

/// Borrowed twin of [`FragmentRecord`] used when writing, so a snapshot is
/// serialized straight from the live records.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FragmentRecordRef<'a> {
    id: &'a str,
    document_id: &'a str,
    chunk_id: &'a str,
    sequence_index: usize,
    content: &'a str,
    embedding: &'a [f32],
    metadata_json: String,
    created_at: DateTime<Utc>,
}

impl<'a> FragmentRecordRef<'a> {
    fn new(fragment: &'a Fragment) -> serde_json::Result<Self> {
        Ok(Self {
            id: &fragment.id,
            document_id: &fragment.document_id,
            chunk_id: &fragment.id,
            sequence_index: fragment.sequence,
            content: &fragment.content,
            embedding: &fragment.embedding,
            metadata_json: serde_json::to_string(&fragment.metadata)?,
            created_at: fragment.created_at,
        })
    }
}

struct Records<'a>(&'a [Fragment]);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for fragment in self.0 {
            let record = FragmentRecordRef::new(fragment).map_err(S::Error::custom)?;
            seq.serialize_element(&record)?;
        }
        seq.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    version: u32,
    dimension: Option<usize>,
    records: Records<'a>,
}

/// Write `fragments` in the [`Snapshot`] layout without copying them.
pub fn write_snapshot<W: Write>(
    writer: W,
    dimension: Option<usize>,
    fragments: &[Fragment],
) -> Result<()> {
    let snapshot =
        SnapshotRef { version: SNAPSHOT_VERSION, dimension, records: Records(fragments) };
    serde_json::to_writer(writer, &snapshot)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub dimension: Option<usize>,
    pub records: Vec<FragmentRecord>,
}

impl Snapshot {
    pub fn from_fragments(dimension: Option<usize>, fragments: &[Fragment]) -> Result<Self> {
        let records =
            fragments.iter().map(FragmentRecord::from_fragment).collect::<Result<_>>()?;
        Ok(Self { version: SNAPSHOT_VERSION, dimension, records })
    }

    pub fn check_version(&self) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(Error::Store(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }
        Ok(())
    }
}
