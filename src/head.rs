//! The head: live series, label postings, the shared chunk pool and the chunk mapper.

use crate::disk::ChunkDiskMapper;
use crate::error::DbError;
use crate::index::HeadIndexReader;
use crate::ooo_head_read::{OooHeadChunkReader, OooHeadIndexReader};
use crate::pool::ChunkPool;
use crate::postings::MemPostings;
use crate::series::{MemSeries, SeriesLookup};
use crate::telemetry::{db_metrics, noop_event_listener, DbEvent, DbEventListener};
use crate::types::{HeadChunkId, Labels, SeriesRef, Timestamp};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_CHUNK_BUFFER_CAPACITY: usize = 16 << 20;

/// Configuration options for the Head
#[derive(Debug, Clone)]
pub struct HeadConfig {
    /// Maximum number of idle chunk buffers kept for reuse (0 disables pooling)
    pub chunk_pool_capacity: usize,
    /// Initial byte capacity of freshly allocated chunk buffers
    pub chunk_buffer_capacity: usize,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn DbEventListener>,
}

impl Default for HeadConfig {
    fn default() -> Self {
        HeadConfig {
            chunk_pool_capacity: 1024,
            chunk_buffer_capacity: 256,
            event_listener: noop_event_listener(),
        }
    }
}

/// Head section as read from a config file. Every field optional for layering.
#[derive(Debug, Default, Deserialize)]
pub struct HeadFileConfig {
    pub chunk_pool_capacity: Option<usize>,
    pub chunk_buffer_capacity: Option<usize>,
}

impl HeadConfig {
    /// Overlays the fields present in `file` and validates the result.
    pub fn apply_file_config(&mut self, file: &HeadFileConfig) -> Result<(), DbError> {
        if let Some(v) = file.chunk_pool_capacity {
            self.chunk_pool_capacity = v;
        }
        if let Some(v) = file.chunk_buffer_capacity {
            self.chunk_buffer_capacity = v;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), DbError> {
        if self.chunk_buffer_capacity > MAX_CHUNK_BUFFER_CAPACITY {
            return Err(DbError::ConfigError(format!(
                "chunk_buffer_capacity {} exceeds {} bytes",
                self.chunk_buffer_capacity, MAX_CHUNK_BUFFER_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Process-local counters, readable without a metrics recorder.
#[derive(Debug, Default)]
pub struct HeadStats {
    series_not_found: AtomicU64,
    chunk_resolve_failures: AtomicU64,
}

impl HeadStats {
    pub fn series_not_found(&self) -> u64 {
        self.series_not_found.load(Ordering::Relaxed)
    }

    pub fn chunk_resolve_failures(&self) -> u64 {
        self.chunk_resolve_failures.load(Ordering::Relaxed)
    }
}

/// In-memory front of the database as seen by the out-of-order read path.
#[derive(Debug)]
pub struct Head {
    series: SeriesLookup,
    postings: MemPostings,
    pool: Arc<ChunkPool>,
    chunk_mapper: Arc<dyn ChunkDiskMapper>,
    stats: HeadStats,
    config: HeadConfig,
}

impl Head {
    pub fn new(config: HeadConfig, chunk_mapper: Arc<dyn ChunkDiskMapper>) -> Result<Self, DbError> {
        config.validate()?;
        Ok(Self {
            series: SeriesLookup::default(),
            postings: MemPostings::new(),
            pool: Arc::new(ChunkPool::new(
                config.chunk_pool_capacity,
                config.chunk_buffer_capacity,
            )),
            chunk_mapper,
            stats: HeadStats::default(),
            config,
        })
    }

    /// Returns the series for `labels`, creating and indexing it if absent.
    ///
    /// New series get the next ref of a counter that never goes back, so a ref of a
    /// garbage-collected series is never handed out again.
    pub fn get_or_create(&self, labels: Labels) -> Result<(Arc<MemSeries>, bool), DbError> {
        let (s, created) = self.series.get_or_create(labels)?;
        if created {
            self.postings.add(s.series_ref(), s.labels())?;
        }
        Ok((s, created))
    }

    pub fn series(&self, id: SeriesRef) -> Result<Option<Arc<MemSeries>>, DbError> {
        self.series.get_by_id(id)
    }

    pub fn num_series(&self) -> usize {
        self.series.len()
    }

    pub fn postings(&self) -> &MemPostings {
        &self.postings
    }

    pub fn chunk_pool(&self) -> &Arc<ChunkPool> {
        &self.pool
    }

    pub fn chunk_mapper(&self) -> &dyn ChunkDiskMapper {
        self.chunk_mapper.as_ref()
    }

    pub fn stats(&self) -> &HeadStats {
        &self.stats
    }

    /// Appends to the open OOO chunk of a series.
    pub fn append_ooo(
        &self,
        id: SeriesRef,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
    ) -> Result<(), DbError> {
        let s = self.series(id)?.ok_or(DbError::NotFound)?;
        s.append_ooo_head(min_time, max_time, bytes, &self.pool)
    }

    /// Persists `bytes` through the mapper and records them as the newest mmapped chunk.
    /// Rejected while the series has an open chunk; close it first.
    pub fn add_mmapped_ooo_chunk(
        &self,
        id: SeriesRef,
        min_time: Timestamp,
        max_time: Timestamp,
        bytes: &[u8],
    ) -> Result<HeadChunkId, DbError> {
        let s = self.series(id)?.ok_or(DbError::NotFound)?;
        s.add_mmapped_chunk(min_time, max_time, bytes, self.chunk_mapper.as_ref())
    }

    /// Closes the open OOO chunk of a series. See [`MemSeries::mmap_ooo_head`].
    pub fn mmap_ooo_head_chunk(&self, id: SeriesRef) -> Result<Option<HeadChunkId>, DbError> {
        let s = self.series(id)?.ok_or(DbError::NotFound)?;
        s.mmap_ooo_head(self.chunk_mapper.as_ref(), &self.pool)
    }

    /// Drops mmapped OOO chunks ending before `mint` from every series.
    pub fn truncate_ooo(&self, mint: Timestamp) -> Result<usize, DbError> {
        let mut total = 0;
        for s in self.series.all()? {
            let (removed, first_chunk_id) = s.truncate_ooo_before(mint)?;
            if removed > 0 {
                self.config.event_listener.on_event(DbEvent::OooChunksTruncated {
                    series: s.series_ref(),
                    removed,
                    first_chunk_id,
                });
            }
            total += removed;
        }
        Ok(total)
    }

    /// Removes one series from the lookup and the postings index.
    pub fn remove_series(&self, id: SeriesRef) -> Result<bool, DbError> {
        let Some(s) = self.series.remove(id)? else {
            return Ok(false);
        };
        self.postings.delete(id, s.labels())?;
        s.release_head_buffer(&self.pool)?;
        Ok(true)
    }

    /// Removes every series for which `predicate` holds. Returns how many were removed.
    pub fn gc_series(&self, predicate: impl Fn(&MemSeries) -> bool) -> Result<usize, DbError> {
        let mut removed = 0;
        for s in self.series.all()? {
            if predicate(&s) && self.remove_series(s.series_ref())? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.config
                .event_listener
                .on_event(DbEvent::SeriesGarbageCollected { removed });
        }
        Ok(removed)
    }

    /// Looks a series up for a reader, counting misses.
    pub(crate) fn series_for_read(&self, id: SeriesRef) -> Result<Arc<MemSeries>, DbError> {
        match self.series.get_by_id(id)? {
            Some(s) => Ok(s),
            None => {
                self.stats.series_not_found.fetch_add(1, Ordering::Relaxed);
                db_metrics::record_series_not_found();
                self.config
                    .event_listener
                    .on_event(DbEvent::SeriesNotFound { series: id });
                Err(DbError::NotFound)
            }
        }
    }

    pub(crate) fn record_chunk_resolve_failure(
        &self,
        series: SeriesRef,
        chunk_id: HeadChunkId,
        err: &DbError,
    ) {
        self.stats
            .chunk_resolve_failures
            .fetch_add(1, Ordering::Relaxed);
        db_metrics::record_chunk_resolve_failure();
        self.config
            .event_listener
            .on_event(DbEvent::OooChunkResolveFailed {
                series,
                chunk_id,
                error: err.to_string(),
            });
    }
}

/// Reader constructors. Readers keep the head alive through the `Arc`.
pub trait HeadReaders {
    fn index(&self) -> HeadIndexReader;
    fn ooo_index_reader(&self, mint: Timestamp, maxt: Timestamp) -> OooHeadIndexReader;
    fn ooo_chunk_reader(&self, mint: Timestamp, maxt: Timestamp) -> OooHeadChunkReader;
}

impl HeadReaders for Arc<Head> {
    fn index(&self) -> HeadIndexReader {
        HeadIndexReader::new(Arc::clone(self))
    }

    fn ooo_index_reader(&self, mint: Timestamp, maxt: Timestamp) -> OooHeadIndexReader {
        OooHeadIndexReader::new(Arc::clone(self), mint, maxt)
    }

    fn ooo_chunk_reader(&self, mint: Timestamp, maxt: Timestamp) -> OooHeadChunkReader {
        OooHeadChunkReader::new(Arc::clone(self), mint, maxt)
    }
}
