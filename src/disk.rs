//! Chunk mapper contract for closed (mmapped) OOO chunks, plus an in-memory implementation.

use crate::error::DbError;
use crate::pool::ChunkPool;
use crate::types::{SeriesRef, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Location of a chunk inside the chunk mapper.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DiskChunkRef(pub u64);

/// Backing memory of a resolved chunk.
#[derive(Debug, Clone)]
pub enum ChunkBytes {
    /// Owned by the chunk mapper; immutable and never pooled.
    Mapped(Arc<[u8]>),
    /// A buffer taken from the shared [`ChunkPool`].
    Pooled(Vec<u8>),
}

impl ChunkBytes {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ChunkBytes::Mapped(b) => &b[..],
            ChunkBytes::Pooled(b) => &b[..],
        }
    }
}

/// Result of a mapper lookup.
#[derive(Debug)]
pub struct ResolvedChunk {
    pub bytes: ChunkBytes,
    /// The bytes were materialized for this read only and go back to the pool once the
    /// reader is done with them.
    pub recycle_after_use: bool,
}

/// Storage for closed OOO chunks. Reads are synchronous (memory-mapped in the steady state).
pub trait ChunkDiskMapper: std::fmt::Debug + Send + Sync + 'static {
    /// Persists a closed chunk and returns where it lives.
    fn write_chunk(
        &self,
        series: SeriesRef,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
    ) -> Result<DiskChunkRef, DbError>;

    /// Looks a chunk up. Pooled results must be taken from `pool`.
    fn chunk(&self, disk_ref: DiskChunkRef, pool: &ChunkPool) -> Result<ResolvedChunk, DbError>;
}

/// Keeps chunks in process memory.
///
/// With `copy_on_read` every read is served from a pooled copy, the way a file-backed
/// mapper without mmap would behave.
#[derive(Debug, Default)]
pub struct MemChunkMapper {
    chunks: RwLock<Vec<Arc<[u8]>>>,
    copy_on_read: bool,
}

impl MemChunkMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_copy_on_read() -> Self {
        Self {
            chunks: RwLock::default(),
            copy_on_read: true,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkDiskMapper for MemChunkMapper {
    fn write_chunk(
        &self,
        _series: SeriesRef,
        _min_time: Timestamp,
        _max_time: Timestamp,
        bytes: &[u8],
    ) -> Result<DiskChunkRef, DbError> {
        let mut chunks = self.chunks.write()?;
        chunks.push(Arc::from(bytes));
        Ok(DiskChunkRef(chunks.len() as u64 - 1))
    }

    fn chunk(&self, disk_ref: DiskChunkRef, pool: &ChunkPool) -> Result<ResolvedChunk, DbError> {
        let chunks = self.chunks.read()?;
        let bytes = chunks.get(disk_ref.0 as usize).ok_or_else(|| {
            DbError::ChunkMapper(format!("no chunk at disk ref {}", disk_ref.0))
        })?;
        if self.copy_on_read {
            return Ok(ResolvedChunk {
                bytes: ChunkBytes::Pooled(pool.get_copy(bytes)),
                recycle_after_use: true,
            });
        }
        Ok(ResolvedChunk {
            bytes: ChunkBytes::Mapped(Arc::clone(bytes)),
            recycle_after_use: false,
        })
    }
}
