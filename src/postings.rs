//! Postings lists and the in-memory label postings index of the head.

use crate::error::DbError;
use crate::types::{Labels, SeriesRef};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::RwLock;

/// Duplicate-free list of series refs matching a label condition.
///
/// Lists are ordered by ref, except those returned by `IndexReader::sorted_postings`,
/// which follow the label order of their series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Postings(Vec<SeriesRef>);

impl Postings {
    pub fn empty() -> Self {
        Postings(Vec::new())
    }

    /// Builds a postings list from refs in any order.
    pub fn new(mut refs: Vec<SeriesRef>) -> Self {
        refs.sort_unstable();
        refs.dedup();
        Postings(refs)
    }

    /// Keeps the given order as-is. `refs` must not contain duplicates.
    pub(crate) fn from_ordered(refs: Vec<SeriesRef>) -> Self {
        Postings(refs)
    }

    /// Union of several ref-ordered postings lists (k-way merge).
    pub fn merge(lists: Vec<Postings>) -> Postings {
        let mut lists: Vec<Vec<SeriesRef>> = lists
            .into_iter()
            .map(|p| p.0)
            .filter(|l| !l.is_empty())
            .collect();
        match lists.len() {
            0 => return Postings::empty(),
            1 => return Postings(lists.pop().unwrap_or_default()),
            _ => {}
        }

        let total: usize = lists.iter().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        let mut cursors = vec![0usize; lists.len()];
        let mut heap: BinaryHeap<Reverse<(SeriesRef, usize)>> =
            lists.iter().enumerate().map(|(i, l)| Reverse((l[0], i))).collect();

        while let Some(Reverse((id, i))) = heap.pop() {
            if out.last() != Some(&id) {
                out.push(id);
            }
            cursors[i] += 1;
            if let Some(&next) = lists[i].get(cursors[i]) {
                heap.push(Reverse((next, i)));
            }
        }
        Postings(out)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SeriesRef> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: SeriesRef) -> bool {
        self.0.contains(&id)
    }

    pub fn into_vec(self) -> Vec<SeriesRef> {
        self.0
    }
}

type ValuePostings = BTreeMap<String, Vec<SeriesRef>>;

/// Label name -> label value -> sorted series refs.
#[derive(Debug, Default)]
pub struct MemPostings {
    m: RwLock<BTreeMap<String, ValuePostings>>,
}

impl MemPostings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every label of a series.
    pub fn add(&self, id: SeriesRef, labels: &Labels) -> Result<(), DbError> {
        let mut m = self.m.write()?;
        for l in labels {
            let list = m
                .entry(l.name.clone())
                .or_default()
                .entry(l.value.clone())
                .or_default();
            if let Err(pos) = list.binary_search(&id) {
                list.insert(pos, id);
            }
        }
        Ok(())
    }

    /// Removes a series from every list it was added to, dropping emptied entries.
    pub fn delete(&self, id: SeriesRef, labels: &Labels) -> Result<(), DbError> {
        let mut m = self.m.write()?;
        for l in labels {
            let Some(values) = m.get_mut(&l.name) else {
                continue;
            };
            if let Some(list) = values.get_mut(&l.value) {
                if let Ok(pos) = list.binary_search(&id) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    values.remove(&l.value);
                }
            }
            if values.is_empty() {
                m.remove(&l.name);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str, value: &str) -> Result<Postings, DbError> {
        let m = self.m.read()?;
        Ok(m
            .get(name)
            .and_then(|values| values.get(value))
            .map(|list| Postings(list.clone()))
            .unwrap_or_default())
    }

    /// Sorted label names.
    pub fn label_names(&self) -> Result<Vec<String>, DbError> {
        Ok(self.m.read()?.keys().cloned().collect())
    }

    /// Sorted values of one label name.
    pub fn label_values(&self, name: &str) -> Result<Vec<String>, DbError> {
        let m = self.m.read()?;
        Ok(m
            .get(name)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default())
    }
}
