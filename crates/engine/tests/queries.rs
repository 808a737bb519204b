// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! End-to-end read queries, run through both backends.

use smelt_engine::{
	EngineSettings, ExecutionContext, ExecutionMode, compile,
	plan::{
		AggregateExpr, AggregateFunc, AggregateNode, BinaryOp, Expression, FilterNode, JoinKind, JoinNode,
		JoinStrategy, MapNode, PhysicalPlan, SortDirection, SortKey, SortNode, TableScanNode, TakeNode,
	},
	test_utils::{TestDb, int8_rows},
};
use smelt_type::Value;

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn scan(table: smelt_core::TableId) -> PhysicalPlan {
	PhysicalPlan::TableScan(TableScanNode {
		table,
		parallel: true,
	})
}

fn col(i: usize) -> Expression {
	Expression::Column(i)
}

fn int(v: i64) -> Expression {
	Expression::Constant(Value::int8(v))
}

fn bin(op: BinaryOp, left: Expression, right: Expression) -> Expression {
	Expression::Binary {
		op,
		left: Box::new(left),
		right: Box::new(right),
	}
}

/// Run the plan serially on both backends and insist they agree.
fn run_both(db: &TestDb, plan: &PhysicalPlan) -> Vec<Vec<Value>> {
	let settings = EngineSettings::serial();
	let (interpreted, _) = db.run(plan, &settings, ExecutionMode::Interpreted).unwrap();
	let (compiled, _) = db.run(plan, &settings, ExecutionMode::Compiled).unwrap();
	assert_eq!(interpreted, compiled, "backends disagree");
	interpreted
}

fn two_column_table(db: &TestDb, rows: &[&[i64]]) -> smelt_catalog::TableDef {
	let table = db.create_table("t", &[("a", smelt_type::Type::Int8, true), ("b", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(rows)).unwrap();
	table
}

#[test]
fn test_filter_and_map() {
	init_tracing();
	let db = TestDb::new();
	let table = two_column_table(&db, &[&[1, 10], &[2, 20], &[3, 30], &[4, 40]]);

	let plan = PhysicalPlan::Map(MapNode {
		input: Box::new(PhysicalPlan::Filter(FilterNode {
			input: Box::new(scan(table.id)),
			predicate: bin(BinaryOp::GreaterThanEqual, col(0), int(2)),
		})),
		projections: vec![bin(BinaryOp::Add, col(1), int(1))],
	});

	let rows = run_both(&db, &plan);
	assert_eq!(rows, vec![vec![Value::int8(21)], vec![Value::int8(31)], vec![Value::int8(41)]]);
}

#[test]
fn test_filter_rejects_null_predicate() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("a", smelt_type::Type::Int8, true)]);
	db.seed(&table, &[vec![Value::int8(1)], vec![Value::Undefined], vec![Value::int8(2)]]).unwrap();

	let plan = PhysicalPlan::Filter(FilterNode {
		input: Box::new(scan(table.id)),
		predicate: bin(BinaryOp::LessThan, col(0), int(3)),
	});

	// the null row compares to null, which is not true
	let rows = run_both(&db, &plan);
	assert_eq!(rows, vec![vec![Value::int8(1)], vec![Value::int8(2)]]);
}

#[test]
fn test_null_propagates_through_projection() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("a", smelt_type::Type::Int8, true)]);
	db.seed(&table, &[vec![Value::Undefined]]).unwrap();

	let plan = PhysicalPlan::Map(MapNode {
		input: Box::new(scan(table.id)),
		projections: vec![bin(BinaryOp::Add, col(0), int(1))],
	});
	assert_eq!(run_both(&db, &plan), vec![vec![Value::Undefined]]);
}

#[test]
fn test_division_by_zero_fails_query() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("a", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(&[&[1]])).unwrap();

	let plan = PhysicalPlan::Map(MapNode {
		input: Box::new(scan(table.id)),
		projections: vec![bin(BinaryOp::Divide, col(0), int(0))],
	});
	let err = db.run(&plan, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap_err();
	assert_eq!(err.code(), "RUNTIME_002");
}

#[test]
fn test_grouped_aggregation() {
	init_tracing();
	let db = TestDb::new();
	let table = db.create_table("t", &[("g", smelt_type::Type::Int8, true), ("v", smelt_type::Type::Int8, true)]);
	db.seed(
		&table,
		&[
			vec![Value::int8(1), Value::int8(10)],
			vec![Value::int8(1), Value::int8(20)],
			vec![Value::int8(2), Value::int8(30)],
			vec![Value::int8(2), Value::Undefined],
		],
	)
	.unwrap();

	let plan = PhysicalPlan::Aggregate(AggregateNode {
		input: Box::new(scan(table.id)),
		group_by: vec![col(0)],
		aggregates: vec![
			AggregateExpr {
				func: AggregateFunc::CountStar,
				arg: None,
			},
			AggregateExpr {
				func: AggregateFunc::Count,
				arg: Some(col(1)),
			},
			AggregateExpr {
				func: AggregateFunc::Sum,
				arg: Some(col(1)),
			},
			AggregateExpr {
				func: AggregateFunc::Min,
				arg: Some(col(1)),
			},
			AggregateExpr {
				func: AggregateFunc::Max,
				arg: Some(col(1)),
			},
		],
	});

	let mut rows = run_both(&db, &plan);
	rows.sort();
	assert_eq!(
		rows,
		vec![
			vec![Value::int8(1), Value::int8(2), Value::int8(2), Value::int8(30), Value::int8(10), Value::int8(20)],
			// count(*) counts the null row, count(v) and sum skip it
			vec![Value::int8(2), Value::int8(2), Value::int8(1), Value::int8(30), Value::int8(30), Value::int8(30)],
		]
	);
}

#[test]
fn test_global_aggregate_over_empty_input() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);

	let plan = PhysicalPlan::Aggregate(AggregateNode {
		input: Box::new(scan(table.id)),
		group_by: vec![],
		aggregates: vec![
			AggregateExpr {
				func: AggregateFunc::CountStar,
				arg: None,
			},
			AggregateExpr {
				func: AggregateFunc::Sum,
				arg: Some(col(0)),
			},
		],
	});

	let rows = run_both(&db, &plan);
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0][0], Value::int8(0));
	assert_eq!(rows[0][1], Value::Undefined);
}

#[test]
fn test_avg_is_float() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(&[&[1], &[2]])).unwrap();

	let plan = PhysicalPlan::Aggregate(AggregateNode {
		input: Box::new(scan(table.id)),
		group_by: vec![],
		aggregates: vec![AggregateExpr {
			func: AggregateFunc::Avg,
			arg: Some(col(0)),
		}],
	});
	assert_eq!(run_both(&db, &plan), vec![vec![Value::float8(1.5)]]);
}

#[test]
fn test_sort_and_take() {
	init_tracing();
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(&[&[5], &[3], &[8], &[1], &[9]])).unwrap();

	let plan = PhysicalPlan::Take(TakeNode {
		input: Box::new(PhysicalPlan::Sort(SortNode {
			input: Box::new(scan(table.id)),
			keys: vec![SortKey {
				column: 0,
				direction: SortDirection::Ascending,
			}],
		})),
		offset: 1,
		limit: Some(2),
	});

	assert_eq!(run_both(&db, &plan), vec![vec![Value::int8(3)], vec![Value::int8(5)]]);
}

#[test]
fn test_sort_descending_nulls_first() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	db.seed(&table, &[vec![Value::int8(2)], vec![Value::Undefined], vec![Value::int8(7)]]).unwrap();

	let plan = PhysicalPlan::Sort(SortNode {
		input: Box::new(scan(table.id)),
		keys: vec![SortKey {
			column: 0,
			direction: SortDirection::Descending,
		}],
	});
	assert_eq!(run_both(&db, &plan), vec![vec![Value::int8(7)], vec![Value::int8(2)], vec![Value::Undefined]]);
}

fn join_fixture(db: &TestDb) -> (smelt_catalog::TableDef, smelt_catalog::TableDef) {
	let left = db.create_table("l", &[("id", smelt_type::Type::Int8, true), ("lv", smelt_type::Type::Int8, true)]);
	db.seed(&left, &int8_rows(&[&[1, 100], &[2, 200], &[3, 300]])).unwrap();
	let right = db.create_table("r", &[("id", smelt_type::Type::Int8, true), ("rv", smelt_type::Type::Int8, true)]);
	db.seed(&right, &int8_rows(&[&[1, 7], &[1, 8], &[2, 9]])).unwrap();
	(left, right)
}

fn join_plan(left: &smelt_catalog::TableDef, right: &smelt_catalog::TableDef, kind: JoinKind) -> PhysicalPlan {
	PhysicalPlan::Join(JoinNode {
		left: Box::new(scan(left.id)),
		right: Box::new(scan(right.id)),
		kind,
		strategy: JoinStrategy::Hash,
		left_keys: vec![col(0)],
		right_keys: vec![col(0)],
		residual: None,
	})
}

#[test]
fn test_hash_inner_join() {
	init_tracing();
	let db = TestDb::new();
	let (left, right) = join_fixture(&db);

	let mut rows = run_both(&db, &join_plan(&left, &right, JoinKind::Inner));
	rows.sort();
	assert_eq!(rows, int8_rows(&[&[1, 100, 1, 7], &[1, 100, 1, 8], &[2, 200, 2, 9]]));
}

#[test]
fn test_hash_left_join_pads_with_nulls() {
	let db = TestDb::new();
	let (left, right) = join_fixture(&db);

	let mut rows = run_both(&db, &join_plan(&left, &right, JoinKind::Left));
	rows.sort();
	let mut expected = int8_rows(&[&[1, 100, 1, 7], &[1, 100, 1, 8], &[2, 200, 2, 9]]);
	expected.push(vec![Value::int8(3), Value::int8(300), Value::Undefined, Value::Undefined]);
	expected.sort();
	assert_eq!(rows, expected);
}

#[test]
fn test_hash_semi_join_emits_left_once() {
	let db = TestDb::new();
	let (left, right) = join_fixture(&db);

	let mut rows = run_both(&db, &join_plan(&left, &right, JoinKind::Semi));
	rows.sort();
	// id 1 matches twice on the right but the left row appears once
	assert_eq!(rows, int8_rows(&[&[1, 100], &[2, 200]]));
}

#[test]
fn test_null_keys_never_match() {
	let db = TestDb::new();
	let left = db.create_table("l", &[("id", smelt_type::Type::Int8, true)]);
	db.seed(&left, &[vec![Value::Undefined], vec![Value::int8(1)]]).unwrap();
	let right = db.create_table("r", &[("id", smelt_type::Type::Int8, true)]);
	db.seed(&right, &[vec![Value::Undefined], vec![Value::int8(1)]]).unwrap();

	let plan = PhysicalPlan::Join(JoinNode {
		left: Box::new(scan(left.id)),
		right: Box::new(scan(right.id)),
		kind: JoinKind::Inner,
		strategy: JoinStrategy::Hash,
		left_keys: vec![col(0)],
		right_keys: vec![col(0)],
		residual: None,
	});
	assert_eq!(run_both(&db, &plan), int8_rows(&[&[1, 1]]));
}

#[test]
fn test_nested_loop_join_with_residual() {
	let db = TestDb::new();
	let (left, right) = join_fixture(&db);

	let plan = PhysicalPlan::Join(JoinNode {
		left: Box::new(scan(left.id)),
		right: Box::new(scan(right.id)),
		kind: JoinKind::Inner,
		strategy: JoinStrategy::NestedLoop,
		left_keys: vec![],
		right_keys: vec![],
		// l.id < r.rv
		residual: Some(bin(BinaryOp::LessThan, col(0), col(3))),
	});

	let mut rows = run_both(&db, &plan);
	rows.sort();
	let mut expected = int8_rows(&[
		&[1, 100, 1, 7],
		&[1, 100, 1, 8],
		&[1, 100, 2, 9],
		&[2, 200, 1, 7],
		&[2, 200, 1, 8],
		&[2, 200, 2, 9],
		&[3, 300, 1, 7],
		&[3, 300, 1, 8],
		&[3, 300, 2, 9],
	]);
	expected.sort();
	assert_eq!(rows, expected);
}

#[test]
fn test_parallel_aggregation_covers_all_blocks() {
	init_tracing();
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	// enough rows to span several heap blocks, so the build pipeline
	// actually splits across workers
	let rows: Vec<Vec<Value>> = (0..2500).map(|i| vec![Value::int8(i)]).collect();
	db.seed(&table, &rows).unwrap();

	let plan = PhysicalPlan::Aggregate(AggregateNode {
		input: Box::new(scan(table.id)),
		group_by: vec![bin(BinaryOp::Remainder, col(0), int(2))],
		aggregates: vec![
			AggregateExpr {
				func: AggregateFunc::CountStar,
				arg: None,
			},
			AggregateExpr {
				func: AggregateFunc::Sum,
				arg: Some(col(0)),
			},
		],
	});

	let settings = EngineSettings {
		worker_count: 4,
		..EngineSettings::default()
	};
	let (mut rows, _) = db.run(&plan, &settings, ExecutionMode::Compiled).unwrap();
	rows.sort();
	assert_eq!(rows, int8_rows(&[&[0, 1250, 1_561_250], &[1, 1250, 1_562_500]]));
}

#[test]
fn test_interleaved_mode_matches_interpreted() {
	let db = TestDb::new();
	let table = two_column_table(&db, &[&[1, 10], &[2, 20], &[3, 30]]);

	let plan = PhysicalPlan::Filter(FilterNode {
		input: Box::new(scan(table.id)),
		predicate: bin(BinaryOp::GreaterThan, col(1), int(10)),
	});
	let settings = EngineSettings::serial();
	let (interpreted, _) = db.run(&plan, &settings, ExecutionMode::Interpreted).unwrap();
	let (interleaved, _) = db.run(&plan, &settings, ExecutionMode::Interleaved).unwrap();
	assert_eq!(interpreted, interleaved);
}

#[test]
fn test_cancellation_stops_before_first_pipeline() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(&[&[1]])).unwrap();

	let settings = EngineSettings::serial();
	let query = compile(&scan(table.id), &db.catalog, &settings).unwrap();
	let mut ctx = ExecutionContext::new(db.transaction(), settings);
	ctx.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
	let err = query.run(&mut ctx, ExecutionMode::Interpreted).unwrap_err();
	assert_eq!(err.code(), "EXEC_001");
}

#[test]
fn test_feature_counters_record_rows() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", smelt_type::Type::Int8, true)]);
	db.seed(&table, &int8_rows(&[&[1], &[2], &[3]])).unwrap();

	let settings = EngineSettings::serial();
	let query = compile(&scan(table.id), &db.catalog, &settings).unwrap();
	assert!(!query.static_features().is_empty());

	let mut ctx = ExecutionContext::new(db.transaction(), settings);
	query.run(&mut ctx, ExecutionMode::Interpreted).unwrap();
	let total: i64 = ctx.features().records().iter().map(|r| r.value).sum();
	// scan and output both observed three rows
	assert_eq!(total, 6);
}
