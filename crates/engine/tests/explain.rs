// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Explain output and its round trip through the parser.

use smelt_engine::{
	EngineSettings, compile,
	explain::{explain, explain_bytecode, explain_ir, parse_summary},
	plan::{
		AggregateExpr, AggregateFunc, AggregateNode, BinaryOp, Expression, FilterNode, PhysicalPlan, TableScanNode,
	},
	test_utils::TestDb,
};
use smelt_type::{Type, Value};

fn filter_plan(table: smelt_core::TableId) -> PhysicalPlan {
	PhysicalPlan::Filter(FilterNode {
		input: Box::new(PhysicalPlan::TableScan(TableScanNode {
			table,
			parallel: true,
		})),
		predicate: Expression::Binary {
			op: BinaryOp::GreaterThan,
			left: Box::new(Expression::Column(0)),
			right: Box::new(Expression::Constant(Value::int8(1))),
		},
	})
}

#[test]
fn test_summary_round_trips() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", Type::Int8, true)]);

	let query = compile(&filter_plan(table.id), &db.catalog, &EngineSettings::serial()).unwrap();
	let text = explain(&query);
	let parsed = parse_summary(&text).unwrap();

	assert_eq!(parsed.len(), 1);
	assert_eq!(parsed[0].id, 0);
	assert!(parsed[0].serial);
	assert!(parsed[0].depends_on.is_empty());
	assert_eq!(parsed[0].operators, vec!["TableScan", "Filter", "Output"]);
}

#[test]
fn test_summary_shows_pipeline_dependencies() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", Type::Int8, true)]);

	let plan = PhysicalPlan::Aggregate(AggregateNode {
		input: Box::new(PhysicalPlan::TableScan(TableScanNode {
			table: table.id,
			parallel: true,
		})),
		group_by: vec![Expression::Column(0)],
		aggregates: vec![AggregateExpr {
			func: AggregateFunc::CountStar,
			arg: None,
		}],
	});
	let query = compile(&plan, &db.catalog, &EngineSettings::default()).unwrap();
	let parsed = parse_summary(&explain(&query)).unwrap();

	// the build pipeline runs first and the output pipeline depends on it
	assert_eq!(parsed.len(), 2);
	assert_eq!(parsed[0].id, 1);
	assert!(!parsed[0].serial);
	assert_eq!(parsed[0].operators, vec!["TableScan", "Aggregate"]);
	assert_eq!(parsed[1].id, 0);
	assert_eq!(parsed[1].depends_on, vec![1]);
	assert_eq!(parsed[1].operators, vec!["Aggregate", "Output"]);
}

#[test]
fn test_explain_ir_includes_generated_functions() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", Type::Int8, true)]);

	let query = compile(&filter_plan(table.id), &db.catalog, &EngineSettings::serial()).unwrap();
	let text = explain_ir(&query);
	assert!(text.contains("pipeline p0"));
	assert!(text.contains("p0_work"));
	assert!(text.contains("@table_iter_advance"));
}

#[test]
fn test_explain_bytecode_disassembles() {
	let db = TestDb::new();
	let table = db.create_table("t", &[("v", Type::Int8, true)]);

	let query = compile(&filter_plan(table.id), &db.catalog, &EngineSettings::serial()).unwrap();
	let text = explain_bytecode(&query).unwrap();
	assert!(text.contains("p0_work"));
	assert!(text.contains("call"));
	assert!(text.contains("jump_if_false"));
}
