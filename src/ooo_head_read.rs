//! Readers that expose the out-of-order chunks of the head to the query engine.
//!
//! [`OooHeadIndexReader`] answers series lookups with overlap-merged chunk descriptors
//! and forwards every other index call to the general [`HeadIndexReader`].
//! [`OooHeadChunkReader`] turns those descriptors' refs back into chunk bytes.

use crate::chunks::{overlaps_closed_interval, ChunkMeta};
use crate::error::DbError;
use crate::head::Head;
use crate::index::{ChunkReader, HeadIndexReader, IndexReader};
use crate::postings::Postings;
use crate::safe_chunk::SafeChunk;
use crate::series::MemSeries;
use crate::types::{ChunkRef, Labels, SeriesRef, Timestamp};
use std::sync::Arc;

/// Index reader over the OOO chunks of the head for the closed range `[mint, maxt]`.
#[derive(Debug, Clone)]
pub struct OooHeadIndexReader {
    inner: HeadIndexReader,
    head: Arc<Head>,
    mint: Timestamp,
    maxt: Timestamp,
}

impl OooHeadIndexReader {
    pub fn new(head: Arc<Head>, mint: Timestamp, maxt: Timestamp) -> Self {
        Self {
            inner: HeadIndexReader::new(Arc::clone(&head)),
            head,
            mint,
            maxt,
        }
    }

    /// Merged, non-overlapping chunk descriptors of series `id` for the query range,
    /// sorted by `min_time`. Empty when no OOO chunk overlaps the range.
    pub fn series_chunks(&self, id: SeriesRef) -> Result<Vec<ChunkMeta>, DbError> {
        let mut chks = Vec::new();
        let s = self.head.series_for_read(id)?;
        self.fill_chunks(&s, &mut chks)?;
        Ok(chks)
    }

    /// Fills `lbls` and, if given, `chks` (cleared first) for series `id`.
    pub fn series(
        &self,
        id: SeriesRef,
        lbls: &mut Labels,
        chks: Option<&mut Vec<ChunkMeta>>,
    ) -> Result<(), DbError> {
        let s = self.head.series_for_read(id)?;
        lbls.copy_from(s.labels());

        match chks {
            Some(chks) => self.fill_chunks(&s, chks),
            None => Ok(()),
        }
    }

    fn fill_chunks(
        &self,
        s: &MemSeries,
        chks: &mut Vec<ChunkMeta>,
    ) -> Result<(), DbError> {
        let ooo = s.lock()?;
        // The anchor must describe exactly the chunks seen under this lock.
        ooo.collect_candidates(s.series_ref(), self.mint, self.maxt)?
            .merge_into(chks);
        Ok(())
    }
}

impl IndexReader for OooHeadIndexReader {
    fn label_names(&self) -> Result<Vec<String>, DbError> {
        self.inner.label_names()
    }

    fn label_values(&self, name: &str) -> Result<Vec<String>, DbError> {
        self.inner.label_values(name)
    }

    fn label_value_for(&self, id: SeriesRef, name: &str) -> Result<String, DbError> {
        self.inner.label_value_for(id, name)
    }

    /// Known limitation: the result covers every series with a matching label, not only
    /// series that currently hold OOO chunks. Callers must not assume OOO-only postings.
    fn postings(&self, name: &str, values: &[&str]) -> Result<Postings, DbError> {
        let postings = self.head.postings();
        match values {
            [] => Ok(Postings::empty()),
            [value] => postings.get(name, value),
            _ => {
                let mut lists = Vec::with_capacity(values.len());
                for value in values {
                    lists.push(postings.get(name, value)?);
                }
                Ok(Postings::merge(lists))
            }
        }
    }

    fn sorted_postings(&self, p: Postings) -> Result<Postings, DbError> {
        self.inner.sorted_postings(p)
    }

    fn series_labels(&self, id: SeriesRef) -> Result<Labels, DbError> {
        Ok(self.head.series_for_read(id)?.labels().clone())
    }

    fn close(&self) -> Result<(), DbError> {
        self.inner.close()
    }
}

/// Chunk reader over the OOO chunks of the head for the closed range `[mint, maxt]`.
#[derive(Debug, Clone)]
pub struct OooHeadChunkReader {
    head: Arc<Head>,
    mint: Timestamp,
    maxt: Timestamp,
}

impl OooHeadChunkReader {
    pub fn new(head: Arc<Head>, mint: Timestamp, maxt: Timestamp) -> Self {
        Self { head, mint, maxt }
    }
}

impl ChunkReader for OooHeadChunkReader {
    /// Resolves a ref produced by [`OooHeadIndexReader`].
    ///
    /// `NotFound` when the series was garbage collected after index resolution, when
    /// the chunk id is no longer held by the series, or when the chunk does not overlap
    /// the reader's range. Mapper errors are returned unchanged.
    fn chunk(&self, chunk_ref: ChunkRef) -> Result<SafeChunk, DbError> {
        let (sid, cid) = chunk_ref.unpack();

        // Missing here means the series was garbage collected since the index lookup.
        let s = self.head.series(sid)?.ok_or(DbError::NotFound)?;

        let ooo = s.lock()?;
        let resolved = ooo.resolve(cid, self.head.chunk_mapper(), self.head.chunk_pool());
        drop(ooo);
        let resolved = match resolved {
            Ok(c) => c,
            Err(e) => {
                if !e.is_not_found() {
                    self.head.record_chunk_resolve_failure(sid, cid, &e);
                }
                return Err(e);
            }
        };

        // From here on the handle owns the bytes; dropping it recycles pooled buffers.
        let chunk = SafeChunk::new(
            sid,
            cid,
            resolved.min_time,
            resolved.max_time,
            resolved.bytes,
            resolved.recycle,
            Arc::clone(self.head.chunk_pool()),
        );

        if !overlaps_closed_interval(chunk.min_time(), chunk.max_time(), self.mint, self.maxt) {
            return Err(DbError::NotFound);
        }
        Ok(chunk)
    }

    fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}
