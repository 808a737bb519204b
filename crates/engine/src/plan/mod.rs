// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Physical plan nodes handed to the compiler.
//!
//! Plans arrive fully resolved: every column reference is an ordinal
//! into the child's output row and every table or index reference is a
//! catalog id. The compiler never sees names.

mod expression;

use smelt_core::TableId;
use smelt_type::{Result, Type};

pub use expression::{AggregateExpr, AggregateFunc, BinaryOp, Expression, SortDirection, SortKey, UnaryOp};

use smelt_catalog::Catalog;

#[derive(Clone, Debug)]
pub enum PhysicalPlan {
	TableScan(TableScanNode),
	Filter(FilterNode),
	Map(MapNode),
	Aggregate(AggregateNode),
	Sort(SortNode),
	Take(TakeNode),
	Join(JoinNode),
	Insert(InsertNode),
	Update(UpdateNode),
	Delete(DeleteNode),
}

#[derive(Clone, Debug)]
pub struct TableScanNode {
	pub table: TableId,
	/// Plan-level permission for a parallel scan. The compiler may
	/// still force the pipeline serial (DML, order-sensitive parents).
	pub parallel: bool,
}

#[derive(Clone, Debug)]
pub struct FilterNode {
	pub input: Box<PhysicalPlan>,
	pub predicate: Expression,
}

#[derive(Clone, Debug)]
pub struct MapNode {
	pub input: Box<PhysicalPlan>,
	pub projections: Vec<Expression>,
}

#[derive(Clone, Debug)]
pub struct AggregateNode {
	pub input: Box<PhysicalPlan>,
	/// Group-by keys over the child output. Empty means one global group.
	pub group_by: Vec<Expression>,
	pub aggregates: Vec<AggregateExpr>,
}

#[derive(Clone, Debug)]
pub struct SortNode {
	pub input: Box<PhysicalPlan>,
	pub keys: Vec<SortKey>,
}

#[derive(Clone, Debug)]
pub struct TakeNode {
	pub input: Box<PhysicalPlan>,
	pub offset: u64,
	pub limit: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
	Inner,
	Left,
	Semi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStrategy {
	Hash,
	NestedLoop,
}

#[derive(Clone, Debug)]
pub struct JoinNode {
	pub left: Box<PhysicalPlan>,
	pub right: Box<PhysicalPlan>,
	pub kind: JoinKind,
	pub strategy: JoinStrategy,
	/// Equi-key pairs: `left_keys[i]` over the left child must equal
	/// `right_keys[i]` over the right child. Nested-loop joins instead
	/// evaluate `residual` over the combined row.
	pub left_keys: Vec<Expression>,
	pub right_keys: Vec<Expression>,
	pub residual: Option<Expression>,
}

#[derive(Clone, Debug)]
pub enum InsertSource {
	/// Literal tuples, one expression row per inserted row.
	Values(Vec<Vec<Expression>>),
	Select(Box<PhysicalPlan>),
}

#[derive(Clone, Debug)]
pub struct InsertNode {
	pub table: TableId,
	pub source: InsertSource,
}

#[derive(Clone, Debug)]
pub struct UpdateNode {
	pub table: TableId,
	/// Producing side; must scan `table` so row slots flow through.
	pub input: Box<PhysicalPlan>,
	/// `(column ordinal, new value)` pairs over the child output.
	pub assignments: Vec<(usize, Expression)>,
}

#[derive(Clone, Debug)]
pub struct DeleteNode {
	pub table: TableId,
	pub input: Box<PhysicalPlan>,
}

impl PhysicalPlan {
	/// True for plans that mutate rather than produce rows.
	pub fn is_mutation(&self) -> bool {
		matches!(self, PhysicalPlan::Insert(_) | PhysicalPlan::Update(_) | PhysicalPlan::Delete(_))
	}

	/// Output column types, resolved against the catalog.
	pub fn output_types(&self, catalog: &Catalog) -> Result<Vec<Type>> {
		match self {
			PhysicalPlan::TableScan(scan) => Ok(catalog.table(scan.table)?.column_types()),
			PhysicalPlan::Filter(node) => node.input.output_types(catalog),
			PhysicalPlan::Map(node) => {
				let input = node.input.output_types(catalog)?;
				node.projections.iter().map(|e| e.result_type(&input)).collect()
			}
			PhysicalPlan::Aggregate(node) => {
				let input = node.input.output_types(catalog)?;
				let mut out = Vec::with_capacity(node.group_by.len() + node.aggregates.len());
				for key in &node.group_by {
					out.push(key.result_type(&input)?);
				}
				for agg in &node.aggregates {
					out.push(agg.result_type(&input)?);
				}
				Ok(out)
			}
			PhysicalPlan::Sort(node) => node.input.output_types(catalog),
			PhysicalPlan::Take(node) => node.input.output_types(catalog),
			PhysicalPlan::Join(node) => {
				let mut out = node.left.output_types(catalog)?;
				if node.kind != JoinKind::Semi {
					out.extend(node.right.output_types(catalog)?);
				}
				Ok(out)
			}
			// mutations produce no result rows
			PhysicalPlan::Insert(_) | PhysicalPlan::Update(_) | PhysicalPlan::Delete(_) => Ok(Vec::new()),
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			PhysicalPlan::TableScan(_) => "TableScan",
			PhysicalPlan::Filter(_) => "Filter",
			PhysicalPlan::Map(_) => "Map",
			PhysicalPlan::Aggregate(_) => "Aggregate",
			PhysicalPlan::Sort(_) => "Sort",
			PhysicalPlan::Take(_) => "Take",
			PhysicalPlan::Join(_) => "Join",
			PhysicalPlan::Insert(_) => "Insert",
			PhysicalPlan::Update(_) => "Update",
			PhysicalPlan::Delete(_) => "Delete",
		}
	}
}
