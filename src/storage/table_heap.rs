//! In-memory table heap storing rows addressed by [`Rid`].

use parking_lot::RwLock;

use crate::error::Result;
use crate::types::{Rid, Tuple};

/// Append-only row storage for one table.
///
/// Rows are addressed by the [`Rid`] returned from [`TableHeap::insert_tuple`].
/// The heap is shared between operators behind an `Arc`; interior locking
/// keeps concurrent scans and inserts consistent.
pub struct TableHeap {
    rows: RwLock<Vec<Tuple>>,
}

impl TableHeap {
    /// Creates an empty table heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Appends a tuple and returns its row ID.
    ///
    /// # Errors
    ///
    /// Infallible today; the `Result` mirrors the storage interface the
    /// executors program against.
    pub fn insert_tuple(&self, tuple: Tuple) -> Result<Rid> {
        let mut rows = self.rows.write();
        let rid = Rid::new(rows.len() as u64);
        rows.push(tuple);
        Ok(rid)
    }

    /// Returns the tuple stored under `rid`, if any.
    #[must_use]
    pub fn tuple(&self, rid: Rid) -> Option<Tuple> {
        self.rows.read().get(rid.slot() as usize).cloned()
    }

    /// Returns the tuple at scan position `index`, if any.
    #[must_use]
    pub fn tuple_at(&self, index: usize) -> Option<Tuple> {
        self.rows.read().get(index).cloned()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns whether the heap holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl Default for TableHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_insert_and_fetch() {
        let heap = TableHeap::new();

        let rid = heap
            .insert_tuple(Tuple::new(vec![Value::Int64(1)]))
            .unwrap();
        assert_eq!(rid, Rid::new(0));

        let tuple = heap.tuple(rid).unwrap();
        assert_eq!(tuple.value(0), &Value::Int64(1));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_missing_rid() {
        let heap = TableHeap::new();
        assert!(heap.tuple(Rid::new(3)).is_none());
    }
}
