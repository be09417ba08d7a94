#![doc = include_str!("../README.md")]
// Declare modules
pub mod chunks;
pub mod disk;
pub mod error;
pub mod head;
pub mod index;
pub mod merge;
pub mod ooo_head_read;
pub mod pool;
pub mod postings;
pub mod safe_chunk;
pub mod series;
pub mod telemetry;
pub mod types;

/// Descriptor of one merged out-of-order chunk run.
pub use crate::chunks::ChunkMeta;
/// Chunk mapper contract and its in-memory implementation.
pub use crate::disk::{ChunkDiskMapper, MemChunkMapper};
/// Error type for read-path operations.
pub use crate::error::DbError;
/// The head and its configuration.
pub use crate::head::{Head, HeadConfig, HeadReaders};
/// Reader traits consumed by the query engine.
pub use crate::index::{ChunkReader, HeadIndexReader, IndexReader};
/// Out-of-order head readers.
pub use crate::ooo_head_read::{OooHeadChunkReader, OooHeadIndexReader};
/// Postings list type.
pub use crate::postings::Postings;
/// Read handle for resolved chunk bytes.
pub use crate::safe_chunk::SafeChunk;
/// Structured event hook for observability.
pub use crate::telemetry::{DbEvent, DbEventListener};
/// Reference and label types.
pub use crate::types::{ChunkRef, HeadChunkId, Labels, SeriesRef, Timestamp};
