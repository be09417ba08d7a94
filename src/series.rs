//! In-memory series state for out-of-order chunks and the series lookup of the head.

use crate::chunks::overlaps_closed_interval;
use crate::disk::{ChunkBytes, ChunkDiskMapper, DiskChunkRef};
use crate::error::DbError;
use crate::merge::OooCandidates;
use crate::pool::ChunkPool;
use crate::types::{ChunkRef, HeadChunkId, Labels, SeriesRef, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// A closed, immutable OOO chunk held by the chunk mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmappedChunk {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub disk_ref: DiskChunkRef,
}

/// The single still-appendable OOO chunk of a series. Its buffer comes from the pool.
#[derive(Debug)]
pub struct OooHeadChunk {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    buf: Vec<u8>,
}

impl OooHeadChunk {
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// A chunk resolved under the series lock.
#[derive(Debug)]
pub(crate) struct ResolvedOooChunk {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub bytes: ChunkBytes,
    pub recycle: bool,
}

/// Chunk state guarded by the per-series lock.
///
/// Chunk ids are positional and offset by `first_chunk_id`, which only grows when the
/// oldest mmapped chunks are truncated, so a given id never names two different chunks.
#[derive(Debug, Default)]
pub struct OooChunks {
    mmapped: Vec<MmappedChunk>,
    head: Option<OooHeadChunk>,
    first_chunk_id: HeadChunkId,
}

impl OooChunks {
    pub fn mmapped(&self) -> &[MmappedChunk] {
        &self.mmapped
    }

    pub fn head(&self) -> Option<&OooHeadChunk> {
        self.head.as_ref()
    }

    pub fn first_chunk_id(&self) -> HeadChunkId {
        self.first_chunk_id
    }

    /// Chunk id of the mmapped chunk at `pos`; `pos == mmapped.len()` is the head chunk.
    #[inline]
    pub fn chunk_id(&self, pos: usize) -> HeadChunkId {
        self.first_chunk_id + pos as HeadChunkId
    }

    /// Collects the chunks overlapping `[mint, maxt]`, newest first: the open head chunk,
    /// then mmapped chunks from the most recently cut to the oldest.
    pub fn collect_candidates(
        &self,
        series: SeriesRef,
        mint: Timestamp,
        maxt: Timestamp,
    ) -> Result<OooCandidates, DbError> {
        let mut candidates = OooCandidates::with_capacity(self.mmapped.len() + 1);

        if let Some(c) = &self.head {
            if overlaps_closed_interval(c.min_time, c.max_time, mint, maxt) {
                let r = ChunkRef::pack(series, self.chunk_id(self.mmapped.len()))?;
                candidates.push(c.min_time, c.max_time, r);
            }
        }
        for (pos, c) in self.mmapped.iter().enumerate().rev() {
            if overlaps_closed_interval(c.min_time, c.max_time, mint, maxt) {
                let r = ChunkRef::pack(series, self.chunk_id(pos))?;
                candidates.push(c.min_time, c.max_time, r);
            }
        }
        Ok(candidates)
    }

    /// Resolves a chunk id to bytes and bounds.
    ///
    /// The open head chunk is copied into a pooled buffer, since it keeps changing after
    /// the lock is released. Mmapped chunks come from the mapper as-is.
    pub(crate) fn resolve(
        &self,
        chunk_id: HeadChunkId,
        mapper: &dyn ChunkDiskMapper,
        pool: &ChunkPool,
    ) -> Result<ResolvedOooChunk, DbError> {
        let ix = match chunk_id.checked_sub(self.first_chunk_id) {
            Some(ix) if ix <= self.mmapped.len() as u64 => ix as usize,
            _ => return Err(DbError::NotFound),
        };

        if ix == self.mmapped.len() {
            let head = self.head.as_ref().ok_or(DbError::NotFound)?;
            return Ok(ResolvedOooChunk {
                min_time: head.min_time,
                max_time: head.max_time,
                bytes: ChunkBytes::Pooled(pool.get_copy(&head.buf)),
                recycle: true,
            });
        }

        let c = self.mmapped[ix];
        let resolved = mapper.chunk(c.disk_ref, pool)?;
        Ok(ResolvedOooChunk {
            min_time: c.min_time,
            max_time: c.max_time,
            bytes: resolved.bytes,
            recycle: resolved.recycle_after_use,
        })
    }
}

/// One series of the head.
#[derive(Debug)]
pub struct MemSeries {
    series_ref: SeriesRef,
    labels: Labels,
    ooo: Mutex<OooChunks>,
}

impl MemSeries {
    pub fn new(series_ref: SeriesRef, labels: Labels) -> Self {
        Self {
            series_ref,
            labels,
            ooo: Mutex::new(OooChunks::default()),
        }
    }

    pub fn series_ref(&self) -> SeriesRef {
        self.series_ref
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Acquires the per-series lock.
    pub fn lock(&self) -> Result<MutexGuard<'_, OooChunks>, DbError> {
        Ok(self.ooo.lock()?)
    }

    /// Persists a closed chunk through the mapper and records it as the newest mmapped
    /// chunk, all under the series lock. Returns its chunk id.
    ///
    /// Fails with `OpenHeadChunk` while an open chunk exists; nothing is written then.
    pub fn add_mmapped_chunk(
        &self,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
        mapper: &dyn ChunkDiskMapper,
    ) -> Result<HeadChunkId, DbError> {
        let mut ooo = self.lock()?;
        if ooo.head.is_some() {
            return Err(DbError::OpenHeadChunk(self.series_ref));
        }
        let disk_ref = mapper.write_chunk(self.series_ref, min_time, max_time, bytes)?;
        ooo.mmapped.push(MmappedChunk {
            min_time,
            max_time,
            disk_ref,
        });
        Ok(ooo.chunk_id(ooo.mmapped.len() - 1))
    }

    /// Appends encoded samples to the open OOO chunk, opening one from the pool if needed.
    pub fn append_ooo_head(
        &self,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
        pool: &ChunkPool,
    ) -> Result<(), DbError> {
        let mut guard = self.lock()?;
        let ooo = &mut *guard;
        match &mut ooo.head {
            Some(head) => {
                head.min_time = head.min_time.min(min_time);
                head.max_time = head.max_time.max(max_time);
                head.buf.extend_from_slice(bytes);
            }
            None => {
                ooo.head = Some(OooHeadChunk {
                    min_time,
                    max_time,
                    buf: pool.get_copy(bytes),
                });
            }
        }
        Ok(())
    }

    /// Closes the open OOO chunk: persists it through the mapper, records it as the newest
    /// mmapped chunk and hands its buffer back to the pool. Returns the chunk id, which is
    /// unchanged by the transition.
    pub fn mmap_ooo_head(
        &self,
        mapper: &dyn ChunkDiskMapper,
        pool: &ChunkPool,
    ) -> Result<Option<HeadChunkId>, DbError> {
        let mut ooo = self.lock()?;
        let Some(head) = ooo.head.as_ref() else {
            return Ok(None);
        };
        // Write first: on failure the open chunk stays where it is.
        let disk_ref = mapper.write_chunk(self.series_ref, head.min_time, head.max_time, &head.buf)?;

        let Some(head) = ooo.head.take() else {
            return Ok(None);
        };
        ooo.mmapped.push(MmappedChunk {
            min_time: head.min_time,
            max_time: head.max_time,
            disk_ref,
        });
        let id = ooo.chunk_id(ooo.mmapped.len() - 1);
        pool.put(head.buf);
        Ok(Some(id))
    }

    /// Drops the leading mmapped chunks that end before `mint`. Returns how many were
    /// removed and the first chunk id still held, both read under the same lock.
    pub fn truncate_ooo_before(&self, mint: Timestamp) -> Result<(usize, HeadChunkId), DbError> {
        let mut ooo = self.lock()?;
        let removed = ooo
            .mmapped
            .iter()
            .take_while(|c| c.max_time < mint)
            .count();
        if removed > 0 {
            ooo.mmapped.drain(..removed);
            ooo.first_chunk_id += removed as HeadChunkId;
        }
        Ok((removed, ooo.first_chunk_id))
    }

    /// Takes the open chunk's buffer back into the pool. Used when the series is dropped.
    pub(crate) fn release_head_buffer(&self, pool: &ChunkPool) -> Result<(), DbError> {
        let mut ooo = self.lock()?;
        if let Some(head) = ooo.head.take() {
            pool.put(head.buf);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SeriesMaps {
    by_id: HashMap<SeriesRef, Arc<MemSeries>>,
    by_labels: HashMap<Labels, SeriesRef>,
    /// Last ref handed out. Refs are never reused, so a ref held across a
    /// garbage collection can only miss.
    last_series_id: SeriesRef,
}

/// Series lookup by id and by label set. One series per label set.
#[derive(Debug, Default)]
pub struct SeriesLookup {
    maps: RwLock<SeriesMaps>,
}

impl SeriesLookup {
    pub fn get_by_id(&self, id: SeriesRef) -> Result<Option<Arc<MemSeries>>, DbError> {
        Ok(self.maps.read()?.by_id.get(&id).cloned())
    }

    pub fn get_by_labels(&self, labels: &Labels) -> Result<Option<Arc<MemSeries>>, DbError> {
        let maps = self.maps.read()?;
        Ok(maps
            .by_labels
            .get(labels)
            .and_then(|id| maps.by_id.get(id))
            .cloned())
    }

    /// Returns the series for `labels`, registering it under the next unused ref if absent.
    pub fn get_or_create(&self, labels: Labels) -> Result<(Arc<MemSeries>, bool), DbError> {
        if let Some(s) = self.get_by_labels(&labels)? {
            return Ok((s, false));
        }
        let mut guard = self.maps.write()?;
        let maps = &mut *guard;
        if let Some(s) = maps.by_labels.get(&labels).and_then(|id| maps.by_id.get(id)) {
            return Ok((Arc::clone(s), false));
        }
        let id = maps.last_series_id + 1;
        // The ref must fit a packed chunk ref.
        ChunkRef::pack(id, 0)?;
        maps.last_series_id = id;

        let s = Arc::new(MemSeries::new(id, labels.clone()));
        maps.by_id.insert(id, Arc::clone(&s));
        maps.by_labels.insert(labels, id);
        Ok((s, true))
    }

    pub fn remove(&self, id: SeriesRef) -> Result<Option<Arc<MemSeries>>, DbError> {
        let mut maps = self.maps.write()?;
        let removed = maps.by_id.remove(&id);
        if let Some(s) = &removed {
            maps.by_labels.remove(s.labels());
        }
        Ok(removed)
    }

    /// Snapshot of all live series.
    pub fn all(&self) -> Result<Vec<Arc<MemSeries>>, DbError> {
        Ok(self.maps.read()?.by_id.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.maps.read().map(|m| m.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
