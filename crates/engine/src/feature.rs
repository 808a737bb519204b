// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Operating-unit features for the cost model.
//!
//! Translators describe the work they generate twice: statically at
//! translation time (which kinds of operations an operator performs,
//! over which types) and dynamically at run time (row and cardinality
//! counters recorded through the [`FeatureSink`]).

use std::{
	fmt::{self, Display, Formatter},
	sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smelt_type::Type;

use crate::{
	pipeline::PipelineId,
	plan::{AggregateFunc, Expression, UnaryOp},
	translate::TranslatorId,
};

/// Kind of work an operator performs, derived from the expressions and
/// operators it translates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingUnitKind {
	Arithmetic,
	Compare,
	Logical,
	HashBuild,
	HashProbe,
	SortBuild,
	SortIterate,
	AggregateBuild,
	AggregateIterate,
	TupleScan,
	TupleInsert,
	TupleUpdate,
	TupleDelete,
	IndexInsert,
	IndexDelete,
	OutputEmit,
}

impl Display for OperatingUnitKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", self)
	}
}

/// A static feature: one kind of operation over one value type,
/// attributed to the translator that emits it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticFeature {
	pub translator: TranslatorId,
	pub pipeline: PipelineId,
	pub ty: Type,
	pub kind: OperatingUnitKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureCounter {
	NumRows,
	Cardinality,
}

impl Display for FeatureCounter {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			FeatureCounter::NumRows => f.write_str("num_rows"),
			FeatureCounter::Cardinality => f.write_str("cardinality"),
		}
	}
}

/// A runtime counter value recorded by generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
	pub translator: TranslatorId,
	pub counter: FeatureCounter,
	pub value: i64,
}

/// Shared collector the generated code records counters into. Workers
/// record independently; the order of records is not meaningful.
#[derive(Clone, Default)]
pub struct FeatureSink {
	records: Arc<Mutex<Vec<FeatureRecord>>>,
}

impl FeatureSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&self, record: FeatureRecord) {
		self.records.lock().push(record);
	}

	pub fn records(&self) -> Vec<FeatureRecord> {
		self.records.lock().clone()
	}

	/// Sum of all records for one translator/counter pair.
	pub fn total(&self, translator: TranslatorId, counter: FeatureCounter) -> i64 {
		self.records
			.lock()
			.iter()
			.filter(|r| r.translator == translator && r.counter == counter)
			.map(|r| r.value)
			.sum()
	}
}

/// Walk an expression and derive the `(type, kind)` pairs of the work
/// its evaluation performs. Column and constant loads carry no work of
/// their own.
pub fn expression_features(expr: &Expression, input: &[Type], out: &mut Vec<(Type, OperatingUnitKind)>) {
	match expr {
		Expression::Column(_) | Expression::Constant(_) => {}
		Expression::Binary {
			op,
			left,
			right,
		} => {
			let ty = expr_type_or_undefined(left, input);
			let kind = if op.is_logical() {
				OperatingUnitKind::Logical
			} else if op.is_comparison() {
				OperatingUnitKind::Compare
			} else {
				OperatingUnitKind::Arithmetic
			};
			out.push((ty, kind));
			expression_features(left, input, out);
			expression_features(right, input, out);
		}
		Expression::Unary {
			op,
			operand,
		} => {
			let kind = match op {
				UnaryOp::Not => OperatingUnitKind::Logical,
				UnaryOp::Negate => OperatingUnitKind::Arithmetic,
			};
			out.push((expr_type_or_undefined(operand, input), kind));
			expression_features(operand, input, out);
		}
	}
}

pub fn aggregate_features(func: AggregateFunc, arg_ty: Type, out: &mut Vec<(Type, OperatingUnitKind)>) {
	out.push((arg_ty, OperatingUnitKind::AggregateBuild));
	match func {
		AggregateFunc::Sum | AggregateFunc::Avg => out.push((arg_ty, OperatingUnitKind::Arithmetic)),
		AggregateFunc::Min | AggregateFunc::Max => out.push((arg_ty, OperatingUnitKind::Compare)),
		AggregateFunc::Count | AggregateFunc::CountStar => {}
	}
}

fn expr_type_or_undefined(expr: &Expression, input: &[Type]) -> Type {
	expr.result_type(input).unwrap_or(Type::Undefined)
}

#[cfg(test)]
mod tests {
	use smelt_type::Value;

	use super::*;
	use crate::plan::BinaryOp;

	#[test]
	fn test_expression_features_classify_ops() {
		// (#0 + 1) < 10
		let expr = Expression::Binary {
			op: BinaryOp::LessThan,
			left: Box::new(Expression::Binary {
				op: BinaryOp::Add,
				left: Box::new(Expression::Column(0)),
				right: Box::new(Expression::Constant(Value::int4(1))),
			}),
			right: Box::new(Expression::Constant(Value::int4(10))),
		};
		let mut features = Vec::new();
		expression_features(&expr, &[Type::Int4], &mut features);
		assert_eq!(
			features,
			vec![(Type::Int4, OperatingUnitKind::Compare), (Type::Int4, OperatingUnitKind::Arithmetic)]
		);
	}

	#[test]
	fn test_sink_totals_per_translator() {
		let sink = FeatureSink::new();
		let t0 = TranslatorId(0);
		let t1 = TranslatorId(1);
		for value in [2, 3] {
			sink.record(FeatureRecord {
				translator: t0,
				counter: FeatureCounter::NumRows,
				value,
			});
		}
		sink.record(FeatureRecord {
			translator: t1,
			counter: FeatureCounter::NumRows,
			value: 7,
		});
		assert_eq!(sink.total(t0, FeatureCounter::NumRows), 5);
		assert_eq!(sink.total(t0, FeatureCounter::Cardinality), 0);
	}
}
