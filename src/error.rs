use thiserror::Error;

/// Custom error type for the out-of-order head read path.
#[derive(Error, Debug)]
pub enum DbError {
    /// Expected negative result: the series was garbage collected, the chunk id is no
    /// longer (or not yet) held by the series, or the chunk lies outside the query range.
    #[error("not found")]
    NotFound,

    /// A series ref or chunk id that cannot be represented in a packed chunk reference.
    #[error("invalid chunk reference: series={series}, chunk_id={chunk_id}")]
    InvalidChunkRef { series: u64, chunk_id: u64 },

    /// Closed chunks cannot be added while the series has an open chunk: the open chunk
    /// owns the next chunk id.
    #[error("series {0} has an open out-of-order chunk")]
    OpenHeadChunk(u64),

    #[error("Chunk mapper error: {0}")]
    ChunkMapper(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}

impl DbError {
    /// True for the "nothing here" outcome that queries must tolerate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        DbError::LockError(format!("Mutex/RwLock poisoned: {}", err))
    }
}
