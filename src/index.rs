//! Reader traits consumed by the query engine and the general head index reader.

use crate::error::DbError;
use crate::head::Head;
use crate::postings::Postings;
use crate::safe_chunk::SafeChunk;
use crate::types::{ChunkRef, Labels, SeriesRef};
use std::sync::Arc;

/// Label and postings lookups over a block-like source.
pub trait IndexReader {
    /// Sorted label names present in the index.
    fn label_names(&self) -> Result<Vec<String>, DbError>;

    /// Sorted values of a label name.
    fn label_values(&self, name: &str) -> Result<Vec<String>, DbError>;

    /// Value of label `name` on series `id`.
    fn label_value_for(&self, id: SeriesRef, name: &str) -> Result<String, DbError>;

    /// Series matching `name` equal to any of `values`.
    fn postings(&self, name: &str, values: &[&str]) -> Result<Postings, DbError>;

    /// Reorders postings by the label sets of their series. Unknown series are dropped.
    fn sorted_postings(&self, p: Postings) -> Result<Postings, DbError>;

    /// Labels of series `id`; `NotFound` once the series has been garbage collected.
    fn series_labels(&self, id: SeriesRef) -> Result<Labels, DbError>;

    fn close(&self) -> Result<(), DbError>;
}

/// Resolves chunk references into readable chunk bytes.
pub trait ChunkReader {
    fn chunk(&self, chunk_ref: ChunkRef) -> Result<SafeChunk, DbError>;

    fn close(&self) -> Result<(), DbError>;
}

/// General-purpose index reader over the head.
#[derive(Debug, Clone)]
pub struct HeadIndexReader {
    head: Arc<Head>,
}

impl HeadIndexReader {
    pub fn new(head: Arc<Head>) -> Self {
        Self { head }
    }
}

impl IndexReader for HeadIndexReader {
    fn label_names(&self) -> Result<Vec<String>, DbError> {
        self.head.postings().label_names()
    }

    fn label_values(&self, name: &str) -> Result<Vec<String>, DbError> {
        self.head.postings().label_values(name)
    }

    fn label_value_for(&self, id: SeriesRef, name: &str) -> Result<String, DbError> {
        let s = self.head.series_for_read(id)?;
        s.labels()
            .get(name)
            .map(str::to_string)
            .ok_or(DbError::NotFound)
    }

    fn postings(&self, name: &str, values: &[&str]) -> Result<Postings, DbError> {
        let postings = self.head.postings();
        match values {
            [] => Ok(Postings::empty()),
            [value] => postings.get(name, value),
            _ => {
                let lists = values
                    .iter()
                    .map(|v| postings.get(name, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Postings::merge(lists))
            }
        }
    }

    fn sorted_postings(&self, p: Postings) -> Result<Postings, DbError> {
        let mut series = Vec::with_capacity(p.len());
        for id in p.iter() {
            if let Some(s) = self.head.series(*id)? {
                series.push(s);
            }
        }
        series.sort_by(|a, b| a.labels().cmp(b.labels()).then(a.series_ref().cmp(&b.series_ref())));
        // Keep label order: bypass the ref-sorting constructor.
        Ok(Postings::from_ordered(
            series.iter().map(|s| s.series_ref()).collect(),
        ))
    }

    fn series_labels(&self, id: SeriesRef) -> Result<Labels, DbError> {
        Ok(self.head.series_for_read(id)?.labels().clone())
    }

    fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}
