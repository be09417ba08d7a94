//! Chunk descriptors handed to the query engine.

use crate::types::{ChunkRef, Timestamp};
use serde::{Deserialize, Serialize};

/// Describes one (possibly merged) out-of-order chunk run for a query.
///
/// `min_time`/`max_time` are the merged bounds of the run that starts at `chunk_ref`.
/// The `ooo_last_*` fields are the same for every descriptor of one result and name the
/// newest chunk that was considered, so a reader merging sample data later has a stable
/// upper anchor even if the series has gained chunks since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_ref: ChunkRef,
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub ooo_last_ref: ChunkRef,
    pub ooo_last_min_time: Timestamp,
    pub ooo_last_max_time: Timestamp,
}

/// Closed-interval overlap: touching at either end counts.
#[inline]
pub fn overlaps_closed_interval(
    min_time: Timestamp,
    max_time: Timestamp,
    query_min: Timestamp,
    query_max: Timestamp,
) -> bool {
    min_time <= query_max && query_min <= max_time
}
