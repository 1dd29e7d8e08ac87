//! Integration tests for the execution operators.

use std::sync::Arc;

use tempfile::TempDir;

use rivet::catalog::{Catalog, Column, Schema};
use rivet::executor::{
    AggregationExecutor, AggregationType, Executor, HashJoinExecutor, InsertExecutor,
    InsertSource, SeqScanExecutor,
};
use rivet::expression::{CompareOp, Expr, JoinSide};
use rivet::storage::{BufferPoolManager, DiskManager};
use rivet::types::{DataType, Tuple, Value};

fn create_pool() -> (Arc<BufferPoolManager>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let dm = DiskManager::new(&db_path).unwrap();
    let pool = Arc::new(BufferPoolManager::new(64, dm).unwrap());
    (pool, temp_dir)
}

fn int_tuple(values: &[i64]) -> Tuple {
    Tuple::new(values.iter().map(|v| Value::Int64(*v)).collect())
}

fn drain(executor: &mut dyn Executor) -> Vec<Tuple> {
    executor.init().unwrap();
    let mut rows = Vec::new();
    while let Some(tuple) = executor.next().unwrap() {
        rows.push(tuple);
    }
    rows
}

fn two_column_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Int64),
        Column::new("score", DataType::Int64),
    ])
}

#[test]
fn test_insert_then_seq_scan() {
    let mut catalog = Catalog::new();
    let info = catalog.create_table("t", two_column_schema()).unwrap();

    let rows = vec![int_tuple(&[1, 10]), int_tuple(&[2, 20]), int_tuple(&[3, 30])];
    let mut insert = InsertExecutor::new(Arc::clone(&info.heap), InsertSource::Raw(rows));
    assert!(drain(&mut insert).is_empty());

    let mut scan = SeqScanExecutor::new(Arc::clone(&info.heap), None, info.schema.clone());
    let scanned = drain(&mut scan);
    assert_eq!(scanned.len(), 3);
    assert_eq!(scanned[0], int_tuple(&[1, 10]));
    assert_eq!(scanned[2], int_tuple(&[3, 30]));
}

#[test]
fn test_seq_scan_with_predicate() {
    let mut catalog = Catalog::new();
    let info = catalog.create_table("t", two_column_schema()).unwrap();
    for id in 0..10 {
        info.heap.insert_tuple(int_tuple(&[id, id * 10])).unwrap();
    }

    // score > 40
    let predicate = Expr::compare(
        CompareOp::Gt,
        Expr::Column(1),
        Expr::Literal(Value::Int64(40)),
    );
    let mut scan = SeqScanExecutor::new(
        Arc::clone(&info.heap),
        Some(predicate),
        info.schema.clone(),
    );

    let rows = drain(&mut scan);
    assert_eq!(rows.len(), 5);
    assert!(rows
        .iter()
        .all(|t| t.value(1).as_int64().unwrap() > 40));
}

#[test]
fn test_insert_from_child_executor() {
    let mut catalog = Catalog::new();
    let source_info = catalog.create_table("src", two_column_schema()).unwrap();
    let dest_info = catalog.create_table("dst", two_column_schema()).unwrap();

    for id in 0..6 {
        source_info
            .heap
            .insert_tuple(int_tuple(&[id, id]))
            .unwrap();
    }

    let scan = SeqScanExecutor::new(
        Arc::clone(&source_info.heap),
        None,
        source_info.schema.clone(),
    );
    let mut insert = InsertExecutor::new(
        Arc::clone(&dest_info.heap),
        InsertSource::Child(Box::new(scan)),
    );
    drain(&mut insert);

    assert_eq!(dest_info.heap.len(), 6);
    assert_eq!(dest_info.heap.tuple_at(5).unwrap(), int_tuple(&[5, 5]));
}

#[test]
fn test_hash_join_matches_pairs() {
    let (pool, _temp) = create_pool();
    let mut catalog = Catalog::new();

    let left_info = catalog.create_table("left", two_column_schema()).unwrap();
    let right_info = catalog.create_table("right", two_column_schema()).unwrap();

    // left: (1, 100), (2, 200), (3, 300)
    for id in 1..=3 {
        left_info
            .heap
            .insert_tuple(int_tuple(&[id, id * 100]))
            .unwrap();
    }
    // right: (2, -2), (3, -3), (4, -4)
    for id in 2..=4 {
        right_info
            .heap
            .insert_tuple(int_tuple(&[id, -id]))
            .unwrap();
    }

    let left_scan = SeqScanExecutor::new(
        Arc::clone(&left_info.heap),
        None,
        left_info.schema.clone(),
    );
    let right_scan = SeqScanExecutor::new(
        Arc::clone(&right_info.heap),
        None,
        right_info.schema.clone(),
    );

    // Join on left.id == right.id; output (id, score, right_score).
    let predicate = Expr::compare(
        CompareOp::Eq,
        Expr::JoinColumn {
            side: JoinSide::Left,
            index: 0,
        },
        Expr::JoinColumn {
            side: JoinSide::Right,
            index: 0,
        },
    );
    let output_exprs = vec![
        Expr::JoinColumn {
            side: JoinSide::Left,
            index: 0,
        },
        Expr::JoinColumn {
            side: JoinSide::Left,
            index: 1,
        },
        Expr::JoinColumn {
            side: JoinSide::Right,
            index: 1,
        },
    ];
    let schema = Schema::new(vec![
        Column::new("id", DataType::Int64),
        Column::new("score", DataType::Int64),
        Column::new("right_score", DataType::Int64),
    ]);

    let mut join = HashJoinExecutor::new(
        pool,
        Box::new(left_scan),
        Box::new(right_scan),
        vec![Expr::Column(0)],
        vec![Expr::Column(0)],
        Some(predicate),
        output_exprs,
        schema,
    )
    .unwrap();

    let mut rows = drain(&mut join);
    rows.sort_by_key(|t| t.value(0).as_int64().unwrap());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], int_tuple(&[2, 200, -2]));
    assert_eq!(rows[1], int_tuple(&[3, 300, -3]));
}

#[test]
fn test_hash_join_emits_all_matches_per_probe() {
    let (pool, _temp) = create_pool();
    let mut catalog = Catalog::new();

    let left_info = catalog.create_table("left", two_column_schema()).unwrap();
    let right_info = catalog.create_table("right", two_column_schema()).unwrap();

    // Two left rows share key 7; one right row probes it.
    left_info.heap.insert_tuple(int_tuple(&[7, 1])).unwrap();
    left_info.heap.insert_tuple(int_tuple(&[7, 2])).unwrap();
    right_info.heap.insert_tuple(int_tuple(&[7, 0])).unwrap();

    let predicate = Expr::compare(
        CompareOp::Eq,
        Expr::JoinColumn {
            side: JoinSide::Left,
            index: 0,
        },
        Expr::JoinColumn {
            side: JoinSide::Right,
            index: 0,
        },
    );
    let mut join = HashJoinExecutor::new(
        pool,
        Box::new(SeqScanExecutor::new(
            Arc::clone(&left_info.heap),
            None,
            left_info.schema.clone(),
        )),
        Box::new(SeqScanExecutor::new(
            Arc::clone(&right_info.heap),
            None,
            right_info.schema.clone(),
        )),
        vec![Expr::Column(0)],
        vec![Expr::Column(0)],
        Some(predicate),
        vec![Expr::JoinColumn {
            side: JoinSide::Left,
            index: 1,
        }],
        Schema::new(vec![Column::new("score", DataType::Int64)]),
    )
    .unwrap();

    let mut rows = drain(&mut join);
    rows.sort_by_key(|t| t.value(0).as_int64().unwrap());
    assert_eq!(rows, vec![int_tuple(&[1]), int_tuple(&[2])]);
}

#[test]
fn test_aggregation_with_groups() {
    let mut catalog = Catalog::new();
    let info = catalog.create_table("t", two_column_schema()).unwrap();

    // Two groups: id 1 with scores 10, 20; id 2 with score 5.
    info.heap.insert_tuple(int_tuple(&[1, 10])).unwrap();
    info.heap.insert_tuple(int_tuple(&[1, 20])).unwrap();
    info.heap.insert_tuple(int_tuple(&[2, 5])).unwrap();

    let scan = SeqScanExecutor::new(Arc::clone(&info.heap), None, info.schema.clone());
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![Expr::Column(0)],
        vec![
            (AggregationType::Count, Expr::Column(1)),
            (AggregationType::Sum, Expr::Column(1)),
            (AggregationType::Min, Expr::Column(1)),
            (AggregationType::Max, Expr::Column(1)),
        ],
        None,
        vec![
            Expr::GroupRef(0),
            Expr::AggRef(0),
            Expr::AggRef(1),
            Expr::AggRef(2),
            Expr::AggRef(3),
        ],
        Schema::new(vec![
            Column::new("id", DataType::Int64),
            Column::new("count", DataType::Int64),
            Column::new("sum", DataType::Int64),
            Column::new("min", DataType::Int64),
            Column::new("max", DataType::Int64),
        ]),
    );

    let mut rows = drain(&mut agg);
    rows.sort_by_key(|t| t.value(0).as_int64().unwrap());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], int_tuple(&[1, 2, 30, 10, 20]));
    assert_eq!(rows[1], int_tuple(&[2, 1, 5, 5, 5]));
}

#[test]
fn test_aggregation_having_filters_groups() {
    let mut catalog = Catalog::new();
    let info = catalog.create_table("t", two_column_schema()).unwrap();

    for (id, score) in [(1, 10), (1, 20), (2, 5), (3, 50)] {
        info.heap.insert_tuple(int_tuple(&[id, score])).unwrap();
    }

    let scan = SeqScanExecutor::new(Arc::clone(&info.heap), None, info.schema.clone());
    // HAVING SUM(score) > 25
    let having = Expr::compare(
        CompareOp::Gt,
        Expr::AggRef(0),
        Expr::Literal(Value::Int64(25)),
    );
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![Expr::Column(0)],
        vec![(AggregationType::Sum, Expr::Column(1))],
        Some(having),
        vec![Expr::GroupRef(0), Expr::AggRef(0)],
        Schema::new(vec![
            Column::new("id", DataType::Int64),
            Column::new("sum", DataType::Int64),
        ]),
    );

    let mut rows = drain(&mut agg);
    rows.sort_by_key(|t| t.value(0).as_int64().unwrap());

    assert_eq!(rows, vec![int_tuple(&[1, 30]), int_tuple(&[3, 50])]);
}

#[test]
fn test_join_build_side_through_small_pool() {
    // A small pool forces the join's index pages through eviction while the
    // build side streams in.
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let dm = DiskManager::new(&db_path).unwrap();
    let pool = Arc::new(BufferPoolManager::new(4, dm).unwrap());

    let mut catalog = Catalog::new();
    let left_info = catalog.create_table("left", two_column_schema()).unwrap();
    let right_info = catalog.create_table("right", two_column_schema()).unwrap();

    for id in 0..300 {
        left_info.heap.insert_tuple(int_tuple(&[id, id])).unwrap();
        right_info.heap.insert_tuple(int_tuple(&[id, -id])).unwrap();
    }

    let predicate = Expr::compare(
        CompareOp::Eq,
        Expr::JoinColumn {
            side: JoinSide::Left,
            index: 0,
        },
        Expr::JoinColumn {
            side: JoinSide::Right,
            index: 0,
        },
    );
    let mut join = HashJoinExecutor::new(
        pool,
        Box::new(SeqScanExecutor::new(
            Arc::clone(&left_info.heap),
            None,
            left_info.schema.clone(),
        )),
        Box::new(SeqScanExecutor::new(
            Arc::clone(&right_info.heap),
            None,
            right_info.schema.clone(),
        )),
        vec![Expr::Column(0)],
        vec![Expr::Column(0)],
        Some(predicate),
        vec![Expr::JoinColumn {
            side: JoinSide::Left,
            index: 0,
        }],
        Schema::new(vec![Column::new("id", DataType::Int64)]),
    )
    .unwrap();

    let rows = drain(&mut join);
    assert_eq!(rows.len(), 300);
}
