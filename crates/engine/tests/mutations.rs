// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Write-path behavior: inserts, updates, deletes, index maintenance
//! and the must-abort protocol around constraint violations.

use std::sync::Arc;

use smelt_core::Transaction;
use smelt_engine::{
	EngineSettings, ExecutionMode,
	plan::{
		BinaryOp, DeleteNode, Expression, FilterNode, InsertNode, InsertSource, PhysicalPlan, TableScanNode,
		UpdateNode,
	},
	test_utils::{TestDb, int8_rows},
};
use smelt_type::{Type, Value};

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn scan(table: smelt_core::TableId) -> PhysicalPlan {
	PhysicalPlan::TableScan(TableScanNode {
		table,
		parallel: false,
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

fn values(rows: &[&[i64]]) -> InsertSource {
	InsertSource::Values(rows.iter().map(|r| r.iter().map(|v| int(*v)).collect()).collect())
}

/// id is NOT NULL with a unique index; v is nullable.
fn indexed_table(db: &TestDb) -> smelt_catalog::TableDef {
	let table = db.create_table("t", &[("id", Type::Int8, false), ("v", Type::Int8, true)]);
	db.create_index("t_id", &table, &[0], true);
	table
}

fn table_rows(db: &TestDb, table: &smelt_catalog::TableDef) -> Vec<Vec<Value>> {
	let settings = EngineSettings::serial();
	let (mut rows, _) = db.run(&scan(table.id), &settings, ExecutionMode::Interpreted).unwrap();
	rows.sort();
	rows
}

#[test]
fn test_insert_values() {
	init_tracing();
	let db = TestDb::new();
	let table = indexed_table(&db);

	let plan = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 10], &[2, 20]]),
	});
	let (rows, affected) = db.run(&plan, &EngineSettings::serial(), ExecutionMode::Compiled).unwrap();
	assert!(rows.is_empty());
	assert_eq!(affected, 2);
	assert_eq!(table_rows(&db, &table), int8_rows(&[&[1, 10], &[2, 20]]));
}

#[test]
fn test_insert_unique_violation_marks_must_abort() {
	init_tracing();
	let db = TestDb::new();
	let table = indexed_table(&db);
	let txn = db.transaction();

	let plan = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[4, 1], &[5, 2], &[4, 3]]),
	});
	let settings = EngineSettings::serial();
	let err = db
		.run_in(&plan, &settings, ExecutionMode::Interpreted, Arc::clone(&txn) as Arc<dyn Transaction>)
		.unwrap_err();
	assert_eq!(err.code(), "CONSTRAINT_001");
	assert!(txn.is_must_abort());

	// further statements and commit are refused
	let err = db
		.run_in(&scan(table.id), &settings, ExecutionMode::Interpreted, Arc::clone(&txn) as Arc<dyn Transaction>)
		.unwrap_err();
	assert_eq!(err.code(), "TXN_001");
	assert_eq!(txn.commit().unwrap_err().code(), "TXN_002");

	// the rows before the violating one stay inserted
	assert_eq!(table_rows(&db, &table), int8_rows(&[&[4, 1], &[5, 2]]));

	// and their unique index entries with them: id 4 is still taken
	let reinsert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[4, 9]]),
	});
	let err = db.run(&reinsert, &settings, ExecutionMode::Interpreted).unwrap_err();
	assert_eq!(err.code(), "CONSTRAINT_001");
}

#[test]
fn test_insert_not_null_violation() {
	let db = TestDb::new();
	let table = indexed_table(&db);
	let txn = db.transaction();

	let plan = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: InsertSource::Values(vec![vec![Expression::Constant(Value::Undefined), int(5)]]),
	});
	let err = db
		.run_in(&plan, &EngineSettings::serial(), ExecutionMode::Compiled, Arc::clone(&txn) as Arc<dyn Transaction>)
		.unwrap_err();
	assert_eq!(err.code(), "CONSTRAINT_002");
	assert!(txn.is_must_abort());
}

#[test]
fn test_insert_select() {
	let db = TestDb::new();
	let source = db.create_table("src", &[("id", Type::Int8, false), ("v", Type::Int8, true)]);
	db.seed(&source, &int8_rows(&[&[1, 10], &[2, 20], &[3, 30]])).unwrap();
	let target = indexed_table(&db);

	let plan = PhysicalPlan::Insert(InsertNode {
		table: target.id,
		source: InsertSource::Select(Box::new(PhysicalPlan::Filter(FilterNode {
			input: Box::new(scan(source.id)),
			predicate: bin(BinaryOp::GreaterThan, col(1), int(10)),
		}))),
	});
	let (_, affected) = db.run(&plan, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();
	assert_eq!(affected, 2);
	assert_eq!(table_rows(&db, &target), int8_rows(&[&[2, 20], &[3, 30]]));
}

#[test]
fn test_update_assigns_and_maintains_index() {
	init_tracing();
	let db = TestDb::new();
	let table = indexed_table(&db);
	let insert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 10], &[2, 20]]),
	});
	db.run(&insert, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();

	// move id 1 to id 5
	let update = PhysicalPlan::Update(UpdateNode {
		table: table.id,
		input: Box::new(PhysicalPlan::Filter(FilterNode {
			input: Box::new(scan(table.id)),
			predicate: bin(BinaryOp::Equal, col(0), int(1)),
		})),
		assignments: vec![(0, int(5)), (1, bin(BinaryOp::Add, col(1), int(1)))],
	});
	let (_, affected) = db.run(&update, &EngineSettings::serial(), ExecutionMode::Compiled).unwrap();
	assert_eq!(affected, 1);
	assert_eq!(table_rows(&db, &table), int8_rows(&[&[2, 20], &[5, 11]]));

	// the old unique entry is gone, so id 1 is free again
	let reinsert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 0]]),
	});
	let (_, affected) = db.run(&reinsert, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();
	assert_eq!(affected, 1);
}

#[test]
fn test_update_into_unique_conflict_aborts() {
	let db = TestDb::new();
	let table = indexed_table(&db);
	let insert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 10], &[2, 20]]),
	});
	db.run(&insert, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();

	let txn = db.transaction();
	let update = PhysicalPlan::Update(UpdateNode {
		table: table.id,
		input: Box::new(PhysicalPlan::Filter(FilterNode {
			input: Box::new(scan(table.id)),
			predicate: bin(BinaryOp::Equal, col(0), int(1)),
		})),
		assignments: vec![(0, int(2))],
	});
	let err = db
		.run_in(&update, &EngineSettings::serial(), ExecutionMode::Interpreted, Arc::clone(&txn) as Arc<dyn Transaction>)
		.unwrap_err();
	assert_eq!(err.code(), "CONSTRAINT_001");
	assert!(txn.is_must_abort());
}

#[test]
fn test_delete_with_predicate() {
	init_tracing();
	let db = TestDb::new();
	let table = indexed_table(&db);
	let insert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 10], &[2, 20], &[3, 30]]),
	});
	db.run(&insert, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();

	let delete = PhysicalPlan::Delete(DeleteNode {
		table: table.id,
		input: Box::new(PhysicalPlan::Filter(FilterNode {
			input: Box::new(scan(table.id)),
			predicate: bin(BinaryOp::LessThan, col(1), int(25)),
		})),
	});
	let (_, affected) = db.run(&delete, &EngineSettings::serial(), ExecutionMode::Compiled).unwrap();
	assert_eq!(affected, 2);
	assert_eq!(table_rows(&db, &table), int8_rows(&[&[3, 30]]));

	// deleted ids left no stale unique entries behind
	let reinsert = PhysicalPlan::Insert(InsertNode {
		table: table.id,
		source: values(&[&[1, 0], &[2, 0]]),
	});
	let (_, affected) = db.run(&reinsert, &EngineSettings::serial(), ExecutionMode::Interpreted).unwrap();
	assert_eq!(affected, 2);
}

#[test]
fn test_dml_backends_agree_on_rows_affected() {
	let db = TestDb::new();
	let a = db.create_table("a", &[("v", Type::Int8, true)]);
	let b = db.create_table("b", &[("v", Type::Int8, true)]);
	db.seed(&a, &int8_rows(&[&[1], &[2], &[3]])).unwrap();
	db.seed(&b, &int8_rows(&[&[1], &[2], &[3]])).unwrap();

	let settings = EngineSettings::serial();
	let delete = |table: smelt_core::TableId| {
		PhysicalPlan::Delete(DeleteNode {
			table,
			input: Box::new(PhysicalPlan::Filter(FilterNode {
				input: Box::new(scan(table)),
				predicate: bin(BinaryOp::GreaterThan, col(0), int(1)),
			})),
		})
	};
	let (_, interpreted) = db.run(&delete(a.id), &settings, ExecutionMode::Interpreted).unwrap();
	let (_, compiled) = db.run(&delete(b.id), &settings, ExecutionMode::Compiled).unwrap();
	assert_eq!(interpreted, 2);
	assert_eq!(interpreted, compiled);
}
