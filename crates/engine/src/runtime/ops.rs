// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Scalar operator kernels.
//!
//! Every arithmetic, comparison and logical operation both backends
//! perform funnels through here, so the interpreter and the bytecode
//! VM cannot drift apart on null propagation, promotion or overflow.

use std::cmp::Ordering;

use smelt_type::{Result, Type, Value, diagnostic::runtime, error};

use crate::plan::{BinaryOp, UnaryOp};

/// Evaluate a binary operator over two values.
///
/// Null propagation: any `Undefined` operand yields `Undefined`, except
/// for `and`/`or` which use three-valued logic.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
	match op {
		BinaryOp::And | BinaryOp::Or => logical(op, left, right),
		_ if op.is_comparison() => compare(op, left, right),
		_ => arithmetic(op, left, right),
	}
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
	if operand.is_undefined() {
		return Ok(Value::Undefined);
	}
	match op {
		UnaryOp::Not => match operand.as_bool() {
			Some(b) => Ok(Value::bool(!b)),
			None => Err(error!(runtime::type_mismatch("boolean", operand.get_type()))),
		},
		UnaryOp::Negate => match operand {
			Value::Float8(v) => Ok(Value::float8(-v.value())),
			_ => {
				let ty = operand.get_type();
				let v = operand
					.as_i64()
					.ok_or_else(|| error!(runtime::type_mismatch("numeric", ty)))?;
				let negated = v.checked_neg().ok_or_else(|| error!(runtime::integer_overflow(ty, "negate")))?;
				Value::from_i64(ty, negated).ok_or_else(|| error!(runtime::integer_overflow(ty, "negate")))
			}
		},
	}
}

/// Only `Boolean(true)` is truthy; `false` and `Undefined` are not.
/// Predicates that evaluate to null reject the row.
pub fn truthy(value: &Value) -> bool {
	matches!(value, Value::Boolean(true))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
	if left.is_undefined() || right.is_undefined() {
		return Ok(Value::Undefined);
	}
	let lt = left.get_type();
	let rt = right.get_type();

	if lt == Type::Float8 || rt == Type::Float8 {
		let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
			return Err(error!(runtime::type_mismatch("numeric", if left.as_f64().is_none() { lt } else { rt })));
		};
		let out = match op {
			BinaryOp::Add => l + r,
			BinaryOp::Subtract => l - r,
			BinaryOp::Multiply => l * r,
			BinaryOp::Divide => l / r,
			BinaryOp::Remainder => l % r,
			_ => return Err(error!(runtime::type_mismatch("numeric operator", Type::Float8))),
		};
		// NaN (0.0/0.0 and friends) degrades to Undefined
		return Ok(Value::float8(out));
	}

	if lt.is_integer() && rt.is_integer() {
		let ty = wider(lt, rt);
		// operands always widen to i64, overflow is judged against
		// the promoted result type
		let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) else {
			return Err(error!(runtime::type_mismatch("integer", lt)));
		};
		let name = op_name(op);
		let out = match op {
			BinaryOp::Add => l.checked_add(r),
			BinaryOp::Subtract => l.checked_sub(r),
			BinaryOp::Multiply => l.checked_mul(r),
			BinaryOp::Divide => {
				if r == 0 {
					return Err(error!(runtime::division_by_zero(ty)));
				}
				l.checked_div(r)
			}
			BinaryOp::Remainder => {
				if r == 0 {
					return Err(error!(runtime::division_by_zero(ty)));
				}
				l.checked_rem(r)
			}
			_ => None,
		};
		let out = out.ok_or_else(|| error!(runtime::integer_overflow(ty, name)))?;
		return Value::from_i64(ty, out).ok_or_else(|| error!(runtime::integer_overflow(ty, name)));
	}

	Err(error!(runtime::type_mismatch("numeric", if lt.is_number() { rt } else { lt })))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
	let Some(ord) = cmp_values(left, right)? else {
		return Ok(Value::Undefined);
	};
	let out = match op {
		BinaryOp::Equal => ord == Ordering::Equal,
		BinaryOp::NotEqual => ord != Ordering::Equal,
		BinaryOp::LessThan => ord == Ordering::Less,
		BinaryOp::LessThanEqual => ord != Ordering::Greater,
		BinaryOp::GreaterThan => ord == Ordering::Greater,
		BinaryOp::GreaterThanEqual => ord != Ordering::Less,
		_ => return Err(error!(runtime::type_mismatch("comparison operator", left.get_type()))),
	};
	Ok(Value::bool(out))
}

/// SQL comparison: `None` when either side is null, an error when the
/// types cannot be compared at all.
pub fn cmp_values(left: &Value, right: &Value) -> Result<Option<Ordering>> {
	if left.is_undefined() || right.is_undefined() {
		return Ok(None);
	}
	match (left, right) {
		(Value::Boolean(l), Value::Boolean(r)) => Ok(Some(l.cmp(r))),
		(Value::Utf8(l), Value::Utf8(r)) => Ok(Some(l.cmp(r))),
		_ => {
			let lt = left.get_type();
			let rt = right.get_type();
			if !lt.is_number() || !rt.is_number() {
				return Err(error!(runtime::type_mismatch(type_name(lt), rt)));
			}
			if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
				return Ok(Some(l.cmp(&r)));
			}
			// mixed int/float goes through f64; payloads are never NaN
			let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
				return Err(error!(runtime::type_mismatch(type_name(lt), rt)));
			};
			Ok(l.partial_cmp(&r))
		}
	}
}

/// Total order used by the sorter: nulls first, then the SQL
/// comparison, with cross-type mismatches falling back to the enum
/// order so sorting never fails.
pub fn total_cmp(left: &Value, right: &Value) -> Ordering {
	match (left.is_undefined(), right.is_undefined()) {
		(true, true) => return Ordering::Equal,
		(true, false) => return Ordering::Less,
		(false, true) => return Ordering::Greater,
		(false, false) => {}
	}
	match cmp_values(left, right) {
		Ok(Some(ord)) => ord,
		_ => left.cmp(right),
	}
}

fn logical(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
	let l = bool_or_null(left)?;
	let r = bool_or_null(right)?;
	let out = match op {
		BinaryOp::And => match (l, r) {
			(Some(false), _) | (_, Some(false)) => Some(false),
			(Some(true), Some(true)) => Some(true),
			_ => None,
		},
		BinaryOp::Or => match (l, r) {
			(Some(true), _) | (_, Some(true)) => Some(true),
			(Some(false), Some(false)) => Some(false),
			_ => None,
		},
		_ => return Err(error!(runtime::type_mismatch("logical operator", left.get_type()))),
	};
	Ok(out.map(Value::bool).unwrap_or(Value::Undefined))
}

fn bool_or_null(value: &Value) -> Result<Option<bool>> {
	if value.is_undefined() {
		return Ok(None);
	}
	value.as_bool().map(Some).ok_or_else(|| error!(runtime::type_mismatch("boolean", value.get_type())))
}

fn wider(lhs: Type, rhs: Type) -> Type {
	if lhs.size() >= rhs.size() {
		lhs
	} else {
		rhs
	}
}

fn op_name(op: BinaryOp) -> &'static str {
	match op {
		BinaryOp::Add => "add",
		BinaryOp::Subtract => "subtract",
		BinaryOp::Multiply => "multiply",
		BinaryOp::Divide => "divide",
		BinaryOp::Remainder => "remainder",
		_ => "compare",
	}
}

fn type_name(ty: Type) -> &'static str {
	match ty {
		Type::Boolean => "boolean",
		Type::Int1 => "int1",
		Type::Int2 => "int2",
		Type::Int4 => "int4",
		Type::Int8 => "int8",
		Type::Float8 => "float8",
		Type::Utf8 => "utf8",
		Type::Undefined => "undefined",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_null_propagates_through_arithmetic() {
		let out = binary(BinaryOp::Add, &Value::Undefined, &Value::int4(1)).unwrap();
		assert_eq!(out, Value::Undefined);
	}

	#[test]
	fn test_integer_promotion_to_wider_operand() {
		let out = binary(BinaryOp::Add, &Value::int2(1i16), &Value::int8(2)).unwrap();
		assert_eq!(out, Value::int8(3));
	}

	#[test]
	fn test_overflow_judged_against_promoted_type() {
		let err = binary(BinaryOp::Add, &Value::int1(100), &Value::int1(100)).unwrap_err();
		assert_eq!(err.code(), "RUNTIME_001");
		// same values fit once one side is wider
		let out = binary(BinaryOp::Add, &Value::int1(100), &Value::int2(100i16)).unwrap();
		assert_eq!(out, Value::int2(200i16));
	}

	#[test]
	fn test_integer_division_by_zero() {
		let err = binary(BinaryOp::Divide, &Value::int4(1), &Value::int4(0)).unwrap_err();
		assert_eq!(err.code(), "RUNTIME_002");
	}

	#[test]
	fn test_float_nan_degrades_to_undefined() {
		let out = binary(BinaryOp::Divide, &Value::float8(0.0), &Value::float8(0.0)).unwrap();
		assert_eq!(out, Value::Undefined);
	}

	#[test]
	fn test_mixed_int_float_compare() {
		let out = binary(BinaryOp::LessThan, &Value::int4(1), &Value::float8(1.5)).unwrap();
		assert_eq!(out, Value::bool(true));
	}

	#[test]
	fn test_three_valued_and() {
		assert_eq!(binary(BinaryOp::And, &Value::bool(false), &Value::Undefined).unwrap(), Value::bool(false));
		assert_eq!(binary(BinaryOp::And, &Value::bool(true), &Value::Undefined).unwrap(), Value::Undefined);
		assert_eq!(binary(BinaryOp::Or, &Value::Undefined, &Value::bool(true)).unwrap(), Value::bool(true));
	}

	#[test]
	fn test_null_comparison_is_not_truthy() {
		let out = binary(BinaryOp::Equal, &Value::Undefined, &Value::Undefined).unwrap();
		assert!(!truthy(&out));
	}

	#[test]
	fn test_negate_min_overflows() {
		let err = unary(UnaryOp::Negate, &Value::Int1(i8::MIN)).unwrap_err();
		assert_eq!(err.code(), "RUNTIME_001");
	}

	#[test]
	fn test_utf8_compares_lexically() {
		let out = binary(BinaryOp::LessThan, &Value::utf8("apple"), &Value::utf8("pear")).unwrap();
		assert_eq!(out, Value::bool(true));
	}

	#[test]
	fn test_type_mismatch_is_error() {
		let err = binary(BinaryOp::Add, &Value::utf8("x"), &Value::int4(1)).unwrap_err();
		assert_eq!(err.code(), "RUNTIME_003");
	}
}
