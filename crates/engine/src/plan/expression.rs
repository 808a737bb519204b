// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::{self, Display, Formatter};

use smelt_type::{Result, Type, Value, diagnostic::compile, error};

/// A scalar expression over a single input row.
#[derive(Clone, Debug)]
pub enum Expression {
	/// Ordinal into the input row.
	Column(usize),
	Constant(Value),
	Binary {
		op: BinaryOp,
		left: Box<Expression>,
		right: Box<Expression>,
	},
	Unary {
		op: UnaryOp,
		operand: Box<Expression>,
	},
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
	Add,
	Subtract,
	Multiply,
	Divide,
	Remainder,
	Equal,
	NotEqual,
	LessThan,
	LessThanEqual,
	GreaterThan,
	GreaterThanEqual,
	And,
	Or,
}

impl BinaryOp {
	pub fn is_comparison(&self) -> bool {
		matches!(
			self,
			BinaryOp::Equal
				| BinaryOp::NotEqual | BinaryOp::LessThan
				| BinaryOp::LessThanEqual
				| BinaryOp::GreaterThan
				| BinaryOp::GreaterThanEqual
		)
	}

	pub fn is_logical(&self) -> bool {
		matches!(self, BinaryOp::And | BinaryOp::Or)
	}
}

impl Display for BinaryOp {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let s = match self {
			BinaryOp::Add => "+",
			BinaryOp::Subtract => "-",
			BinaryOp::Multiply => "*",
			BinaryOp::Divide => "/",
			BinaryOp::Remainder => "%",
			BinaryOp::Equal => "==",
			BinaryOp::NotEqual => "!=",
			BinaryOp::LessThan => "<",
			BinaryOp::LessThanEqual => "<=",
			BinaryOp::GreaterThan => ">",
			BinaryOp::GreaterThanEqual => ">=",
			BinaryOp::And => "and",
			BinaryOp::Or => "or",
		};
		f.write_str(s)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
	Not,
	Negate,
}

impl Display for UnaryOp {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			UnaryOp::Not => f.write_str("not"),
			UnaryOp::Negate => f.write_str("-"),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
	Count,
	/// COUNT(*): counts rows rather than defined values.
	CountStar,
	Sum,
	Min,
	Max,
	Avg,
}

impl Display for AggregateFunc {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let s = match self {
			AggregateFunc::Count => "count",
			AggregateFunc::CountStar => "count_star",
			AggregateFunc::Sum => "sum",
			AggregateFunc::Min => "min",
			AggregateFunc::Max => "max",
			AggregateFunc::Avg => "avg",
		};
		f.write_str(s)
	}
}

#[derive(Clone, Debug)]
pub struct AggregateExpr {
	pub func: AggregateFunc,
	/// Argument over the child output; `None` only for `CountStar`.
	pub arg: Option<Expression>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
	Ascending,
	Descending,
}

#[derive(Clone, Debug)]
pub struct SortKey {
	/// Ordinal into the child output.
	pub column: usize,
	pub direction: SortDirection,
}

impl Expression {
	/// Static result type of this expression given the input row types.
	///
	/// Arithmetic promotes mixed integer widths to the wider side and
	/// any integer/float mix to `Float8`, mirroring what the runtime
	/// kernels do with the actual values.
	pub fn result_type(&self, input: &[Type]) -> Result<Type> {
		match self {
			Expression::Column(i) => input
				.get(*i)
				.copied()
				.ok_or_else(|| error!(compile::unsupported_expression(format!("column ordinal {i} out of range")))),
			Expression::Constant(v) => Ok(v.get_type()),
			Expression::Binary {
				op,
				left,
				right,
			} => {
				if op.is_comparison() || op.is_logical() {
					return Ok(Type::Boolean);
				}
				let lhs = left.result_type(input)?;
				let rhs = right.result_type(input)?;
				Ok(promote(lhs, rhs))
			}
			Expression::Unary {
				op,
				operand,
			} => match op {
				UnaryOp::Not => Ok(Type::Boolean),
				UnaryOp::Negate => operand.result_type(input),
			},
		}
	}
}

fn promote(lhs: Type, rhs: Type) -> Type {
	if lhs == Type::Float8 || rhs == Type::Float8 {
		return Type::Float8;
	}
	if lhs.is_integer() && rhs.is_integer() {
		return if lhs.size() >= rhs.size() {
			lhs
		} else {
			rhs
		};
	}
	if lhs == Type::Undefined {
		return rhs;
	}
	lhs
}

impl AggregateExpr {
	pub fn result_type(&self, input: &[Type]) -> Result<Type> {
		match self.func {
			AggregateFunc::Count | AggregateFunc::CountStar => Ok(Type::Int8),
			AggregateFunc::Avg => Ok(Type::Float8),
			AggregateFunc::Sum => {
				let arg = self.arg_type(input)?;
				Ok(if arg == Type::Float8 {
					Type::Float8
				} else {
					Type::Int8
				})
			}
			AggregateFunc::Min | AggregateFunc::Max => self.arg_type(input),
		}
	}

	pub fn arg_type(&self, input: &[Type]) -> Result<Type> {
		match &self.arg {
			Some(expr) => expr.result_type(input),
			None => Ok(Type::Int8),
		}
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Expression::Column(i) => write!(f, "#{i}"),
			Expression::Constant(v) => write!(f, "{v}"),
			Expression::Binary {
				op,
				left,
				right,
			} => write!(f, "({left} {op} {right})"),
			Expression::Unary {
				op,
				operand,
			} => write!(f, "({op} {operand})"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_result_type_promotes_int_widths() {
		let expr = Expression::Binary {
			op: BinaryOp::Add,
			left: Box::new(Expression::Column(0)),
			right: Box::new(Expression::Column(1)),
		};
		assert_eq!(expr.result_type(&[Type::Int2, Type::Int8]).unwrap(), Type::Int8);
		assert_eq!(expr.result_type(&[Type::Int4, Type::Float8]).unwrap(), Type::Float8);
	}

	#[test]
	fn test_comparison_is_boolean() {
		let expr = Expression::Binary {
			op: BinaryOp::LessThan,
			left: Box::new(Expression::Column(0)),
			right: Box::new(Expression::Constant(Value::int8(3))),
		};
		assert_eq!(expr.result_type(&[Type::Int4]).unwrap(), Type::Boolean);
	}

	#[test]
	fn test_column_out_of_range_is_error() {
		let expr = Expression::Column(3);
		assert_eq!(expr.result_type(&[Type::Int4]).unwrap_err().code(), "COMPILE_002");
	}
}
