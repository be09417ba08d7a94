use crate::error::DbError;
use serde::{Deserialize, Serialize};

/// Timestamp type (milliseconds since epoch, signed so sentinels and negative ranges work).
pub type Timestamp = i64;

/// Stable identifier of a series within the head's lifetime.
pub type SeriesRef = u64;

/// Position-derived id of an out-of-order chunk within its series.
pub type HeadChunkId = u64;

const CHUNK_ID_BITS: u32 = 24;
const CHUNK_ID_MASK: u64 = (1 << CHUNK_ID_BITS) - 1;
const MAX_SERIES_REF: u64 = u64::MAX >> CHUNK_ID_BITS;

/// Opaque chunk reference: `series_ref << 24 | chunk_id`.
///
/// Decomposable without any external state.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ChunkRef(pub u64);

impl ChunkRef {
    /// Packs a series ref and chunk id. Fails when either half overflows its bit budget.
    pub fn pack(series: SeriesRef, chunk_id: HeadChunkId) -> Result<Self, DbError> {
        if series > MAX_SERIES_REF || chunk_id > CHUNK_ID_MASK {
            return Err(DbError::InvalidChunkRef { series, chunk_id });
        }
        Ok(ChunkRef(series << CHUNK_ID_BITS | chunk_id))
    }

    /// Splits the reference back into `(series_ref, chunk_id)`.
    #[inline]
    pub fn unpack(self) -> (SeriesRef, HeadChunkId) {
        (self.0 >> CHUNK_ID_BITS, self.0 & CHUNK_ID_MASK)
    }
}

/// A single label name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Ordered label set, sorted by name. Immutable once attached to a series.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Builds a canonical label set. Later duplicates of a name win.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut labels: Vec<Label> = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            match labels.iter_mut().find(|l| l.name == *name) {
                Some(existing) => existing.value = value.to_string(),
                None => labels.push(Label {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
            }
        }
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Labels(labels)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces the contents with `other`, reusing the existing allocation.
    pub fn copy_from(&mut self, other: &Labels) {
        self.0.clear();
        self.0.extend_from_slice(&other.0);
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
