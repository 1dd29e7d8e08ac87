//! Pull-model execution operators.
//!
//! Every operator implements [`Executor`]: `init` primes state, `next`
//! yields tuples one at a time, and `output_schema` describes them. Plans
//! are trees of boxed operators pulling from their children.

mod aggregate;
mod hash_join;
mod insert;
mod seq_scan;

pub use aggregate::{AggregationExecutor, AggregationType};
pub use hash_join::HashJoinExecutor;
pub use insert::{InsertExecutor, InsertSource};
pub use seq_scan::SeqScanExecutor;

use crate::catalog::Schema;
use crate::error::Result;
use crate::types::Tuple;

/// A pull-based physical operator.
pub trait Executor {
    /// Primes the operator's state; must be called before `next`.
    ///
    /// # Errors
    ///
    /// Returns an error if a child operator or storage access fails.
    fn init(&mut self) -> Result<()>;

    /// Returns the next tuple, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation or storage access fails.
    fn next(&mut self) -> Result<Option<Tuple>>;

    /// Describes the tuples this operator produces.
    fn output_schema(&self) -> &Schema;
}
