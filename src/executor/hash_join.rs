//! Hash join operator.
//!
//! A classic two-phase hash join: the build phase drains the left child into
//! the persistent hash index keyed by the hash of the join-key values, with
//! the row id of the retained build tuple as the indexed value; the probe
//! phase looks up each right tuple's key hash, filters the candidates with
//! the join predicate, and projects the survivors.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::catalog::Schema;
use crate::error::{Result, RivetError};
use crate::executor::Executor;
use crate::expression::Expr;
use crate::index::LinearProbeHashTable;
use crate::storage::buffer_pool::BufferPoolManager;
use crate::types::{Rid, Tuple, Value};

/// Initial number of block pages for the join's hash index.
const JOIN_TABLE_BLOCKS: usize = 2;

/// Joins two inputs on equality of their key expressions.
pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_keys: Vec<Expr>,
    right_keys: Vec<Expr>,
    /// Residual predicate evaluated over each candidate pair.
    predicate: Option<Expr>,
    /// Projection of the output row from the joined pair.
    output_exprs: Vec<Expr>,
    schema: Schema,
    join_table: LinearProbeHashTable<u64, Rid>,
    /// Build-side tuples, addressed by the Rids stored in the index.
    build_rows: Vec<Tuple>,
    /// Projected matches for the current probe tuple, drained one per `next`.
    pending: VecDeque<Tuple>,
}

impl HashJoinExecutor {
    /// Creates a hash join of `left` and `right` on the given key
    /// expressions.
    ///
    /// # Errors
    ///
    /// Returns an error if the join's hash index cannot be allocated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
        predicate: Option<Expr>,
        output_exprs: Vec<Expr>,
        schema: Schema,
    ) -> Result<Self> {
        let join_table = LinearProbeHashTable::new(bpm, JOIN_TABLE_BLOCKS)?;
        Ok(Self {
            left,
            right,
            left_keys,
            right_keys,
            predicate,
            output_exprs,
            schema,
            join_table,
            build_rows: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    /// Hashes the values of `keys` evaluated against `tuple`.
    fn hash_keys(keys: &[Expr], tuple: &Tuple) -> Result<u64> {
        let mut hasher = DefaultHasher::new();
        for key in keys {
            key.evaluate(tuple)?.hash(&mut hasher);
        }
        Ok(hasher.finish())
    }

    /// Projects one output tuple from a matching pair.
    fn project(&self, left: &Tuple, right: &Tuple) -> Result<Tuple> {
        let values: Vec<Value> = self
            .output_exprs
            .iter()
            .map(|expr| expr.evaluate_join(left, right))
            .collect::<Result<_>>()?;
        Ok(Tuple::new(values))
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.build_rows.clear();
        self.pending.clear();

        // Build phase. A re-init finds the pairs already indexed; those
        // duplicates are harmless.
        self.left.init()?;
        while let Some(tuple) = self.left.next()? {
            let key_hash = Self::hash_keys(&self.left_keys, &tuple)?;
            let rid = Rid::new(self.build_rows.len() as u64);
            match self.join_table.insert(&key_hash, &rid) {
                Ok(()) | Err(RivetError::DuplicatePair) => {}
                Err(e) => return Err(e),
            }
            self.build_rows.push(tuple);
        }

        self.right.init()?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some(tuple));
            }

            let Some(right_tuple) = self.right.next()? else {
                return Ok(None);
            };

            // Probe phase: hash equality gives candidates, the predicate
            // decides real matches.
            let key_hash = Self::hash_keys(&self.right_keys, &right_tuple)?;
            for rid in self.join_table.get_value(&key_hash)? {
                let left_tuple = &self.build_rows[rid.slot() as usize];
                let matched = match &self.predicate {
                    Some(predicate) => predicate
                        .evaluate_join(left_tuple, &right_tuple)?
                        .as_bool()
                        .unwrap_or(false),
                    None => true,
                };
                if matched {
                    let projected = self.project(left_tuple, &right_tuple)?;
                    self.pending.push_back(projected);
                }
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
