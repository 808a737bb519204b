// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

mod ordered_f64;
mod r#type;

pub use ordered_f64::OrderedF64;
pub use r#type::{GetType, Type};

/// A SQL value, represented as a native Rust type.
///
/// `Undefined` is the uniform null representation: every scalar type has
/// it as its null, and every arithmetic or comparison primitive checks
/// for it before touching the payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
	/// Value is not defined (think null in common programming languages)
	Undefined,
	/// A boolean: true or false.
	Boolean(bool),
	/// A 1-byte signed integer
	Int1(i8),
	/// A 2-byte signed integer
	Int2(i16),
	/// A 4-byte signed integer
	Int4(i32),
	/// An 8-byte signed integer
	Int8(i64),
	/// An 8-byte floating point
	Float8(OrderedF64),
	/// A UTF-8 encoded text
	Utf8(String),
}

impl Value {
	pub fn undefined() -> Self {
		Value::Undefined
	}

	pub fn bool(v: impl Into<bool>) -> Self {
		Value::Boolean(v.into())
	}

	pub fn int1(v: impl Into<i8>) -> Self {
		Value::Int1(v.into())
	}

	pub fn int2(v: impl Into<i16>) -> Self {
		Value::Int2(v.into())
	}

	pub fn int4(v: impl Into<i32>) -> Self {
		Value::Int4(v.into())
	}

	pub fn int8(v: impl Into<i64>) -> Self {
		Value::Int8(v.into())
	}

	pub fn float8(v: impl Into<f64>) -> Self {
		OrderedF64::try_from(v.into()).map(Value::Float8).unwrap_or(Value::Undefined)
	}

	pub fn utf8(v: impl Into<String>) -> Self {
		Value::Utf8(v.into())
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// The scalar type of this value. `Undefined` has no type of its
	/// own and reports [`Type::Undefined`].
	pub fn get_type(&self) -> Type {
		match self {
			Value::Undefined => Type::Undefined,
			Value::Boolean(_) => Type::Boolean,
			Value::Int1(_) => Type::Int1,
			Value::Int2(_) => Type::Int2,
			Value::Int4(_) => Type::Int4,
			Value::Int8(_) => Type::Int8,
			Value::Float8(_) => Type::Float8,
			Value::Utf8(_) => Type::Utf8,
		}
	}

	/// Widen to `i64` if this is any signed integer.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int1(v) => Some(*v as i64),
			Value::Int2(v) => Some(*v as i64),
			Value::Int4(v) => Some(*v as i64),
			Value::Int8(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Float8(v) => Some(v.value()),
			_ => self.as_i64().map(|v| v as f64),
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Boolean(v) => Some(*v),
			_ => None,
		}
	}

	/// Narrow an `i64` back into the given integer type, if it fits.
	pub fn from_i64(ty: Type, v: i64) -> Option<Value> {
		match ty {
			Type::Int1 => i8::try_from(v).ok().map(Value::Int1),
			Type::Int2 => i16::try_from(v).ok().map(Value::Int2),
			Type::Int4 => i32::try_from(v).ok().map(Value::Int4),
			Type::Int8 => Some(Value::Int8(v)),
			_ => None,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Boolean(v) => write!(f, "{}", v),
			Value::Int1(v) => write!(f, "{}", v),
			Value::Int2(v) => write!(f, "{}", v),
			Value::Int4(v) => write!(f, "{}", v),
			Value::Int8(v) => write!(f, "{}", v),
			Value::Float8(v) => write!(f, "{}", v),
			Value::Utf8(v) => write!(f, "{}", v),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_float8_rejects_nan() {
		assert_eq!(Value::float8(f64::NAN), Value::Undefined);
		assert_eq!(Value::float8(1.5), Value::Float8(OrderedF64::try_from(1.5).unwrap()));
	}

	#[test]
	fn test_undefined_sorts_first() {
		let mut values = vec![Value::int4(3), Value::Undefined, Value::int4(1)];
		values.sort();
		assert_eq!(values[0], Value::Undefined);
	}

	#[test]
	fn test_get_type() {
		assert_eq!(Value::int8(1).get_type(), Type::Int8);
		assert_eq!(Value::utf8("x").get_type(), Type::Utf8);
		assert_eq!(Value::Undefined.get_type(), Type::Undefined);
	}
}
