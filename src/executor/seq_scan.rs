//! Sequential scan operator.

use std::sync::Arc;

use crate::catalog::Schema;
use crate::error::Result;
use crate::executor::Executor;
use crate::expression::{eval_predicate, Expr};
use crate::storage::TableHeap;
use crate::types::Tuple;

/// Scans every row of a table heap, applying an optional predicate.
pub struct SeqScanExecutor {
    heap: Arc<TableHeap>,
    predicate: Option<Expr>,
    schema: Schema,
    cursor: usize,
}

impl SeqScanExecutor {
    /// Creates a scan over `heap` producing tuples of `schema`.
    #[must_use]
    pub fn new(heap: Arc<TableHeap>, predicate: Option<Expr>, schema: Schema) -> Self {
        Self {
            heap,
            predicate,
            schema,
            cursor: 0,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        while let Some(tuple) = self.heap.tuple_at(self.cursor) {
            self.cursor += 1;
            let selected = match &self.predicate {
                Some(predicate) => eval_predicate(predicate, &tuple)?,
                None => true,
            };
            if selected {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
