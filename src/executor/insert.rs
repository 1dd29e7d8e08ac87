//! Insert operator.

use std::sync::Arc;

use crate::catalog::Schema;
use crate::error::Result;
use crate::executor::Executor;
use crate::storage::TableHeap;
use crate::types::Tuple;

/// Where an insert gets its rows from.
pub enum InsertSource {
    /// A literal row set embedded in the plan.
    Raw(Vec<Tuple>),
    /// The output of a child operator.
    Child(Box<dyn Executor>),
}

/// Inserts rows into a table heap.
///
/// The operator yields no tuples: the first `next` call performs every
/// insert and returns `None`.
pub struct InsertExecutor {
    heap: Arc<TableHeap>,
    source: InsertSource,
    schema: Schema,
    done: bool,
}

impl InsertExecutor {
    /// Creates an insert into `heap` fed by `source`.
    #[must_use]
    pub fn new(heap: Arc<TableHeap>, source: InsertSource) -> Self {
        Self {
            heap,
            source,
            schema: Schema::empty(),
            done: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        if let InsertSource::Child(child) = &mut self.source {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        match &mut self.source {
            InsertSource::Raw(rows) => {
                for tuple in rows.drain(..) {
                    self.heap.insert_tuple(tuple)?;
                }
            }
            InsertSource::Child(child) => {
                while let Some(tuple) = child.next()? {
                    self.heap.insert_tuple(tuple)?;
                }
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
