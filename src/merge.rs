//! Overlap merging of out-of-order chunk intervals into query descriptors.
//!
//! Candidates are pushed in traversal order (open head chunk first, then mmapped chunks
//! newest to oldest). The first push fixes the "last chunk" anchor for the whole result.
//! [`OooCandidates::merge`] then sorts by `min_time` and folds every overlapping or
//! touching run into a single descriptor that keeps the ref of the run's earliest chunk.

use crate::chunks::ChunkMeta;
use crate::types::{ChunkRef, Timestamp};

/// Collector for the chunks of one series that overlap a query range.
#[derive(Debug, Default)]
pub struct OooCandidates {
    chunks: Vec<ChunkMeta>,
    last: Option<(ChunkRef, Timestamp, Timestamp)>,
}

impl OooCandidates {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(capacity),
            last: None,
        }
    }

    /// Adds a candidate. The caller must push the most recent chunk first.
    pub fn push(&mut self, min_time: Timestamp, max_time: Timestamp, chunk_ref: ChunkRef) {
        let (last_ref, last_min, last_max) =
            *self.last.get_or_insert((chunk_ref, min_time, max_time));
        self.chunks.push(ChunkMeta {
            chunk_ref,
            min_time,
            max_time,
            ooo_last_ref: last_ref,
            ooo_last_min_time: last_min,
            ooo_last_max_time: last_max,
        });
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The anchor fixed by the first push, if any.
    pub fn last(&self) -> Option<(ChunkRef, Timestamp, Timestamp)> {
        self.last
    }

    /// Produces the sorted, mutually non-overlapping descriptor list.
    pub fn merge(self) -> Vec<ChunkMeta> {
        let mut out = Vec::with_capacity(self.chunks.len());
        self.merge_into(&mut out);
        out
    }

    /// Like [`Self::merge`], but appends into a caller-owned buffer after clearing it.
    pub fn merge_into(mut self, out: &mut Vec<ChunkMeta>) {
        out.clear();
        if self.chunks.is_empty() {
            return;
        }

        // Stable: equal min_time keeps traversal order.
        self.chunks.sort_by_key(|c| c.min_time);

        let mut pending = self.chunks[0];
        for c in &self.chunks[1..] {
            if c.min_time > pending.max_time {
                out.push(pending);
                pending = *c;
            } else if c.max_time > pending.max_time {
                pending.max_time = c.max_time;
            }
        }
        out.push(pending);
    }
}
