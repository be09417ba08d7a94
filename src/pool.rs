//! Shared pool of chunk byte buffers.
//!
//! Buffers move between the pool and their single owner by value: a series (for an open
//! OOO head chunk) or a [`crate::safe_chunk::SafeChunk`] (for a transient read copy). A
//! buffer in the pool has no other owner, so a released buffer can never be observed
//! through a stale handle.

use crate::telemetry::db_metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct ChunkPool {
    free: Mutex<Vec<Vec<u8>>>,
    /// Idle buffers kept at most; extra releases are dropped.
    max_idle: usize,
    /// Initial capacity of freshly allocated buffers.
    buffer_capacity: usize,
    recycled: AtomicU64,
}

impl ChunkPool {
    pub fn new(max_idle: usize, buffer_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
            buffer_capacity,
            recycled: AtomicU64::new(0),
        }
    }

    /// Takes an empty buffer, reusing an idle one when available.
    pub fn get(&self) -> Vec<u8> {
        let reused = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => None,
        };
        reused.unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity))
    }

    /// Takes a buffer holding a copy of `bytes`.
    pub fn get_copy(&self, bytes: &[u8]) -> Vec<u8> {
        let mut buf = self.get();
        buf.extend_from_slice(bytes);
        buf
    }

    /// Returns a buffer to the pool. Its contents are cleared before it becomes reachable
    /// by the next [`Self::get`].
    pub fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        // Buffers beyond `max_idle` are dropped and not counted.
        let idle = match self.free.lock() {
            Ok(mut free) if free.len() < self.max_idle => {
                free.push(buf);
                free.len()
            }
            _ => return,
        };
        self.recycled.fetch_add(1, Ordering::Relaxed);
        db_metrics::record_chunk_recycled(idle);
    }

    /// Number of buffers currently idle.
    pub fn idle(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Total number of buffers kept for reuse by [`Self::put`].
    pub fn recycled(&self) -> u64 {
        self.recycled.load(Ordering::Relaxed)
    }
}
