//! Read handle for chunk bytes resolved under a series lock.

use crate::disk::ChunkBytes;
use crate::error::DbError;
use crate::pool::ChunkPool;
use crate::types::{ChunkRef, HeadChunkId, SeriesRef, Timestamp};
use std::sync::Arc;

/// Chunk bytes that stay valid and unmodified after the series lock is released.
///
/// The handle is the only owner of a pooled buffer while it lives. Dropping it (or calling
/// [`SafeChunk::release`]) is what makes a recycle-after-use buffer available to the pool
/// again; mapper-owned bytes are simply let go.
#[derive(Debug)]
pub struct SafeChunk {
    bytes: Option<ChunkBytes>,
    recycle: bool,
    series_ref: SeriesRef,
    chunk_id: HeadChunkId,
    min_time: Timestamp,
    max_time: Timestamp,
    pool: Arc<ChunkPool>,
}

impl SafeChunk {
    pub(crate) fn new(
        series_ref: SeriesRef,
        chunk_id: HeadChunkId,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: ChunkBytes,
        recycle: bool,
        pool: Arc<ChunkPool>,
    ) -> Self {
        Self {
            bytes: Some(bytes),
            recycle,
            series_ref,
            chunk_id,
            min_time,
            max_time,
            pool,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_ref().map(ChunkBytes::as_slice).unwrap_or_default()
    }

    pub fn series_ref(&self) -> SeriesRef {
        self.series_ref
    }

    pub fn chunk_id(&self) -> HeadChunkId {
        self.chunk_id
    }

    pub fn chunk_ref(&self) -> Result<ChunkRef, DbError> {
        ChunkRef::pack(self.series_ref, self.chunk_id)
    }

    pub fn min_time(&self) -> Timestamp {
        self.min_time
    }

    pub fn max_time(&self) -> Timestamp {
        self.max_time
    }

    /// Whether the bytes go back to the shared pool on release.
    pub fn is_recyclable(&self) -> bool {
        self.recycle && matches!(self.bytes, Some(ChunkBytes::Pooled(_)))
    }

    /// Signals the caller is done reading.
    pub fn release(self) {}
}

impl AsRef<[u8]> for SafeChunk {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

impl Drop for SafeChunk {
    fn drop(&mut self) {
        if let Some(ChunkBytes::Pooled(buf)) = self.bytes.take() {
            if self.recycle {
                self.pool.put(buf);
            }
        }
    }
}
