//! Aggregation operator.
//!
//! Drains the child into an in-memory aggregation hash table keyed by the
//! group-by values, combining each tuple into its group's running
//! aggregates, then iterates the groups applying an optional HAVING
//! predicate.

use std::collections::HashMap;

use crate::catalog::Schema;
use crate::error::Result;
use crate::executor::Executor;
use crate::expression::Expr;
use crate::types::{Tuple, Value};

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    /// Row count.
    Count,
    /// Integer sum.
    Sum,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

impl AggregationType {
    fn initial(self) -> Value {
        match self {
            AggregationType::Count | AggregationType::Sum => Value::Int64(0),
            AggregationType::Min | AggregationType::Max => Value::Null,
        }
    }

    /// Folds `input` into the running aggregate `acc`.
    fn combine(self, acc: &mut Value, input: &Value) {
        match self {
            AggregationType::Count => {
                if let Value::Int64(count) = acc {
                    *count += 1;
                }
            }
            AggregationType::Sum => {
                if let (Value::Int64(sum), Some(v)) = (&mut *acc, input.as_int64()) {
                    *sum += v;
                }
            }
            AggregationType::Min => {
                if input.is_null() {
                    return;
                }
                let smaller = match acc.compare(input) {
                    Some(ordering) => ordering.is_gt(),
                    None => acc.is_null(),
                };
                if smaller {
                    *acc = input.clone();
                }
            }
            AggregationType::Max => {
                if input.is_null() {
                    return;
                }
                let larger = match acc.compare(input) {
                    Some(ordering) => ordering.is_lt(),
                    None => acc.is_null(),
                };
                if larger {
                    *acc = input.clone();
                }
            }
        }
    }
}

/// Groups the child's output and computes aggregates per group.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_bys: Vec<Expr>,
    /// Each aggregate pairs its function with the input expression it folds.
    aggregates: Vec<(AggregationType, Expr)>,
    having: Option<Expr>,
    /// Projection over (group_bys, aggregates) per surviving group.
    output_exprs: Vec<Expr>,
    schema: Schema,
    /// Materialized groups, filled by `init`.
    groups: Vec<(Vec<Value>, Vec<Value>)>,
    cursor: usize,
}

impl AggregationExecutor {
    /// Creates an aggregation over `child`.
    #[must_use]
    pub fn new(
        child: Box<dyn Executor>,
        group_bys: Vec<Expr>,
        aggregates: Vec<(AggregationType, Expr)>,
        having: Option<Expr>,
        output_exprs: Vec<Expr>,
        schema: Schema,
    ) -> Self {
        Self {
            child,
            group_bys,
            aggregates,
            having,
            output_exprs,
            schema,
            groups: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.groups.clear();
        self.cursor = 0;

        let mut table: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();
        while let Some(tuple) = self.child.next()? {
            let key: Vec<Value> = self
                .group_bys
                .iter()
                .map(|expr| expr.evaluate(&tuple))
                .collect::<Result<_>>()?;

            let accumulators = table.entry(key).or_insert_with(|| {
                self.aggregates
                    .iter()
                    .map(|(agg_type, _)| agg_type.initial())
                    .collect()
            });

            for ((agg_type, input_expr), acc) in self.aggregates.iter().zip(accumulators) {
                let input = input_expr.evaluate(&tuple)?;
                agg_type.combine(acc, &input);
            }
        }

        self.groups = table.into_iter().collect();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        while self.cursor < self.groups.len() {
            let (group_bys, aggregates) = &self.groups[self.cursor];
            self.cursor += 1;

            let keep = match &self.having {
                Some(having) => having
                    .evaluate_aggregate(group_bys, aggregates)?
                    .as_bool()
                    .unwrap_or(false),
                None => true,
            };
            if !keep {
                continue;
            }

            let values: Vec<Value> = self
                .output_exprs
                .iter()
                .map(|expr| expr.evaluate_aggregate(group_bys, aggregates))
                .collect::<Result<_>>()?;
            return Ok(Some(Tuple::new(values)));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
