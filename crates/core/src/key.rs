// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::Value;

/// An index key encoded into bytes whose memcmp order matches the value
/// order of the key columns, so a BTree over the bytes is a BTree over
/// the keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedKey(pub Vec<u8>);

impl EncodedKey {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

/// Encode a multi-column key. Undefined sorts before every defined
/// value, matching [`Value`]'s own ordering.
pub fn encode_key(values: &[Value]) -> EncodedKey {
	let mut out = Vec::with_capacity(values.len() * 9);
	for value in values {
		encode_value(&mut out, value);
	}
	EncodedKey(out)
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
	match value {
		Value::Undefined => out.push(0x00),
		Value::Boolean(v) => {
			out.push(0x01);
			out.push(*v as u8);
		}
		Value::Int1(v) => encode_i64(out, *v as i64),
		Value::Int2(v) => encode_i64(out, *v as i64),
		Value::Int4(v) => encode_i64(out, *v as i64),
		Value::Int8(v) => encode_i64(out, *v),
		Value::Float8(v) => {
			out.push(0x03);
			// flip the sign bit (and all bits for negatives) so
			// the big-endian bytes sort like the float
			let bits = v.value().to_bits();
			let ordered = if bits & (1 << 63) != 0 {
				!bits
			} else {
				bits ^ (1 << 63)
			};
			out.extend_from_slice(&ordered.to_be_bytes());
		}
		Value::Utf8(v) => {
			out.push(0x04);
			// 0x00 bytes are escaped so the terminator is unambiguous
			for &b in v.as_bytes() {
				if b == 0x00 {
					out.extend_from_slice(&[0x00, 0xFF]);
				} else {
					out.push(b);
				}
			}
			out.extend_from_slice(&[0x00, 0x00]);
		}
	}
}

fn encode_i64(out: &mut Vec<u8>, v: i64) {
	out.push(0x02);
	// offset-binary: flipping the sign bit makes the big-endian
	// encoding order-preserving
	out.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
}

#[cfg(test)]
mod tests {
	use smelt_type::Value;

	use super::*;

	#[test]
	fn test_integer_order_preserved() {
		let neg = encode_key(&[Value::int8(-5)]);
		let zero = encode_key(&[Value::int8(0)]);
		let pos = encode_key(&[Value::int8(5)]);
		assert!(neg < zero);
		assert!(zero < pos);
	}

	#[test]
	fn test_widened_integers_encode_identically() {
		assert_eq!(encode_key(&[Value::int1(7i8)]), encode_key(&[Value::int8(7)]));
	}

	#[test]
	fn test_float_order_preserved() {
		let a = encode_key(&[Value::float8(-1.5)]);
		let b = encode_key(&[Value::float8(0.0)]);
		let c = encode_key(&[Value::float8(3.25)]);
		assert!(a < b);
		assert!(b < c);
	}

	#[test]
	fn test_utf8_embedded_nul_unambiguous() {
		let a = encode_key(&[Value::utf8("a\0b")]);
		let b = encode_key(&[Value::utf8("a"), Value::utf8("b")]);
		assert_ne!(a, b);
	}

	#[test]
	fn test_undefined_sorts_first() {
		let undef = encode_key(&[Value::Undefined]);
		let defined = encode_key(&[Value::int8(i64::MIN)]);
		assert!(undef < defined);
	}
}
