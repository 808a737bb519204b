// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::sync::Arc;

use smelt_type::{Type, Value};

/// An encoded row: a null bitvec, an aligned fixed-width section, and a
/// dynamic tail holding var-len payloads.
///
/// The layout that produced a row is required to read it back; rows do
/// not carry their own schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row(pub Vec<u8>);

impl Row {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[derive(Debug, Clone)]
pub struct RowLayout(Arc<RowLayoutInner>);

impl std::ops::Deref for RowLayout {
	type Target = RowLayoutInner;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

#[derive(Debug)]
pub struct RowLayoutInner {
	pub fields: Vec<Field>,
	/// size of the fixed-width data section in bytes
	pub static_section_size: usize,
	/// size of the null bitvec prefix in bytes
	pub bitvec_size: usize,
	pub alignment: usize,
}

#[derive(Debug)]
pub struct Field {
	pub offset: usize,
	pub size: usize,
	pub ty: Type,
}

fn align_up(value: usize, align: usize) -> usize {
	(value + align - 1) & !(align - 1)
}

impl RowLayout {
	pub fn new(types: &[Type]) -> Self {
		assert!(!types.is_empty());

		let num_fields = types.len();
		let bitvec_size = (num_fields + 7) / 8;

		let mut offset = bitvec_size;
		let mut fields = Vec::with_capacity(num_fields);
		let mut max_align = 1;

		for &ty in types {
			let size = ty.size();
			let align = ty.alignment();

			offset = align_up(offset, align);
			fields.push(Field {
				offset,
				size,
				ty,
			});

			offset += size;
			max_align = max_align.max(align);
		}

		let static_section_size = align_up(offset, max_align) - bitvec_size;

		RowLayout(Arc::new(RowLayoutInner {
			fields,
			static_section_size,
			bitvec_size,
			alignment: max_align,
		}))
	}

	/// Allocate a zeroed row: every field starts undefined.
	pub fn allocate_row(&self) -> Row {
		Row(vec![0u8; self.total_static_size()])
	}

	pub fn total_static_size(&self) -> usize {
		self.bitvec_size + self.static_section_size
	}

	pub fn field_count(&self) -> usize {
		self.fields.len()
	}

	pub fn is_defined(&self, row: &Row, index: usize) -> bool {
		let byte = row.0[index / 8];
		byte & (1 << (index % 8)) != 0
	}

	fn set_defined(&self, row: &mut Row, index: usize, defined: bool) {
		let byte = &mut row.0[index / 8];
		if defined {
			*byte |= 1 << (index % 8);
		} else {
			*byte &= !(1 << (index % 8));
		}
	}

	pub fn set_undefined(&self, row: &mut Row, index: usize) {
		self.set_defined(row, index, false);
	}

	/// Write a value into the field at `index`. Undefined clears the
	/// null bit and leaves the payload bytes untouched; readers must
	/// check the bit first, so stale payload bytes are never observed.
	pub fn set_value(&self, row: &mut Row, index: usize, value: &Value) {
		let field = &self.fields[index];
		match value {
			Value::Undefined => {
				self.set_defined(row, index, false);
				return;
			}
			Value::Boolean(v) => row.0[field.offset] = *v as u8,
			Value::Int1(v) => row.0[field.offset] = *v as u8,
			Value::Int2(v) => {
				row.0[field.offset..field.offset + 2].copy_from_slice(&v.to_le_bytes())
			}
			Value::Int4(v) => {
				row.0[field.offset..field.offset + 4].copy_from_slice(&v.to_le_bytes())
			}
			Value::Int8(v) => {
				row.0[field.offset..field.offset + 8].copy_from_slice(&v.to_le_bytes())
			}
			Value::Float8(v) => {
				row.0[field.offset..field.offset + 8].copy_from_slice(&v.value().to_le_bytes())
			}
			Value::Utf8(v) => {
				// var-len payload goes out of line into the
				// dynamic tail, (offset, len) stays inline
				let dyn_offset = row.0.len() as u32;
				let len = v.len() as u32;
				row.0.extend_from_slice(v.as_bytes());
				row.0[field.offset..field.offset + 4].copy_from_slice(&dyn_offset.to_le_bytes());
				row.0[field.offset + 4..field.offset + 8].copy_from_slice(&len.to_le_bytes());
			}
		}
		self.set_defined(row, index, true);
	}

	/// Read the field at `index` back as a [`Value`]. Var-len payloads
	/// are copied into an owned buffer; the row is only borrowed for
	/// the duration of the call.
	pub fn get_value(&self, row: &Row, index: usize) -> Value {
		if !self.is_defined(row, index) {
			return Value::Undefined;
		}
		let field = &self.fields[index];
		let at = field.offset;
		match field.ty {
			Type::Boolean => Value::Boolean(row.0[at] != 0),
			Type::Int1 => Value::Int1(row.0[at] as i8),
			Type::Int2 => Value::Int2(i16::from_le_bytes([row.0[at], row.0[at + 1]])),
			Type::Int4 => {
				let mut buf = [0u8; 4];
				buf.copy_from_slice(&row.0[at..at + 4]);
				Value::Int4(i32::from_le_bytes(buf))
			}
			Type::Int8 => {
				let mut buf = [0u8; 8];
				buf.copy_from_slice(&row.0[at..at + 8]);
				Value::Int8(i64::from_le_bytes(buf))
			}
			Type::Float8 => {
				let mut buf = [0u8; 8];
				buf.copy_from_slice(&row.0[at..at + 8]);
				Value::float8(f64::from_le_bytes(buf))
			}
			Type::Utf8 => {
				let mut buf = [0u8; 4];
				buf.copy_from_slice(&row.0[at..at + 4]);
				let dyn_offset = u32::from_le_bytes(buf) as usize;
				buf.copy_from_slice(&row.0[at + 4..at + 8]);
				let len = u32::from_le_bytes(buf) as usize;
				let bytes = &row.0[dyn_offset..dyn_offset + len];
				Value::Utf8(String::from_utf8_lossy(bytes).into_owned())
			}
			Type::Undefined => Value::Undefined,
		}
	}
}

#[cfg(test)]
mod tests {
	use smelt_type::{Type, Value};

	use super::*;

	#[test]
	fn test_roundtrip_fixed_width() {
		let layout = RowLayout::new(&[Type::Boolean, Type::Int4, Type::Int8, Type::Float8]);
		let mut row = layout.allocate_row();

		layout.set_value(&mut row, 0, &Value::bool(true));
		layout.set_value(&mut row, 1, &Value::int4(-42));
		layout.set_value(&mut row, 2, &Value::int8(1i64 << 40));
		layout.set_value(&mut row, 3, &Value::float8(2.5));

		assert_eq!(layout.get_value(&row, 0), Value::bool(true));
		assert_eq!(layout.get_value(&row, 1), Value::int4(-42));
		assert_eq!(layout.get_value(&row, 2), Value::int8(1i64 << 40));
		assert_eq!(layout.get_value(&row, 3), Value::float8(2.5));
	}

	#[test]
	fn test_fresh_row_is_all_undefined() {
		let layout = RowLayout::new(&[Type::Int4, Type::Utf8]);
		let row = layout.allocate_row();

		assert_eq!(layout.get_value(&row, 0), Value::Undefined);
		assert_eq!(layout.get_value(&row, 1), Value::Undefined);
	}

	#[test]
	fn test_utf8_out_of_line() {
		let layout = RowLayout::new(&[Type::Utf8, Type::Int2]);
		let mut row = layout.allocate_row();

		layout.set_value(&mut row, 0, &Value::utf8("hello world"));
		layout.set_value(&mut row, 1, &Value::int2(7i16));

		assert_eq!(layout.get_value(&row, 0), Value::utf8("hello world"));
		assert_eq!(layout.get_value(&row, 1), Value::int2(7i16));
		assert!(row.len() > layout.total_static_size());
	}

	#[test]
	fn test_set_undefined_clears_bit() {
		let layout = RowLayout::new(&[Type::Int4]);
		let mut row = layout.allocate_row();

		layout.set_value(&mut row, 0, &Value::int4(9));
		assert!(layout.is_defined(&row, 0));

		layout.set_value(&mut row, 0, &Value::Undefined);
		assert_eq!(layout.get_value(&row, 0), Value::Undefined);
	}

	#[test]
	fn test_field_offsets_are_aligned() {
		let layout = RowLayout::new(&[Type::Boolean, Type::Int8]);
		assert_eq!(layout.fields[1].offset % 8, 0);
	}
}
