// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Runtime objects the generated code holds handles to.
//!
//! Persistent objects (inserters, aggregation and join hash tables,
//! sorters) never embed handles to other objects; iterators snapshot
//! the rows they walk so they stay valid independent of the arena the
//! parent lives in.

use std::{cmp::Ordering, collections::HashMap};

use smelt_core::{Row, RowLayout, RowSlot, StorageEngine, TableId, encode_key};
use smelt_type::{Result, Value, diagnostic::internal, error};

use crate::{
	plan::{AggregateFunc, SortDirection},
	runtime::{AggSpec, InserterSpec, JoinSpec, ScanSpec, SorterSpec, ops},
};

#[derive(Debug)]
pub enum RuntimeObject {
	TableIter(TableIter),
	Inserter(Inserter),
	WriteRow(WriteRow),
	AggTable(AggTable),
	JoinTable(JoinTable),
	Sorter(Sorter),
	/// Iterator over materialized rows (aggregation output, join
	/// matches, sorted runs).
	RowIter(RowIter),
}

/// Block-range scan over a table heap. Loads one block at a time so
/// parallel workers touch disjoint blocks.
#[derive(Debug)]
pub struct TableIter {
	table: TableId,
	layout: RowLayout,
	next_block: u32,
	end_block: u32,
	buffer: Vec<(RowSlot, Row)>,
	pos: usize,
	current: Option<(RowSlot, Row)>,
}

impl TableIter {
	pub fn new(spec: &ScanSpec, begin_block: u32, end_block: u32) -> Self {
		Self {
			table: spec.table,
			layout: RowLayout::new(&spec.types),
			next_block: begin_block,
			end_block,
			buffer: Vec::new(),
			pos: 0,
			current: None,
		}
	}

	pub fn advance(&mut self, storage: &dyn StorageEngine) -> Result<bool> {
		loop {
			if self.pos < self.buffer.len() {
				self.current = Some(self.buffer[self.pos].clone());
				self.pos += 1;
				return Ok(true);
			}
			if self.next_block >= self.end_block {
				self.current = None;
				return Ok(false);
			}
			self.buffer = storage.scan_block(self.table, self.next_block)?;
			self.next_block += 1;
			self.pos = 0;
		}
	}

	pub fn column(&self, index: usize) -> Result<Value> {
		let (_, row) = self.current.as_ref().ok_or_else(|| error!(internal::internal("table iterator not positioned")))?;
		Ok(self.layout.get_value(row, index))
	}

	pub fn slot(&self) -> Result<RowSlot> {
		self.current
			.as_ref()
			.map(|(slot, _)| *slot)
			.ok_or_else(|| error!(internal::internal("table iterator not positioned")))
	}
}

/// Write path for one table: owns the row layout and the declared
/// index set, resolved from the catalog at translation time.
#[derive(Debug)]
pub struct Inserter {
	spec: InserterSpec,
	layout: RowLayout,
}

impl Inserter {
	pub fn new(spec: &InserterSpec) -> Self {
		Self {
			layout: RowLayout::new(&spec.types),
			spec: spec.clone(),
		}
	}

	pub fn table_name(&self) -> &str {
		&self.spec.table_name
	}

	pub fn column_name(&self, index: usize) -> &str {
		self.spec.column_names.get(index).map(String::as_str).unwrap_or("?")
	}

	pub fn not_null(&self) -> &[usize] {
		&self.spec.not_null
	}

	pub fn index_name(&self, ordinal: usize) -> &str {
		self.spec.indexes.get(ordinal).map(|i| i.name.as_str()).unwrap_or("?")
	}

	pub fn acquire_row(&self) -> WriteRow {
		WriteRow {
			values: vec![Value::Undefined; self.spec.types.len()],
		}
	}

	fn encode(&self, row: &WriteRow) -> Row {
		let mut encoded = self.layout.allocate_row();
		for (i, value) in row.values.iter().enumerate() {
			self.layout.set_value(&mut encoded, i, value);
		}
		encoded
	}

	pub fn insert(&self, storage: &dyn StorageEngine, row: &WriteRow) -> Result<RowSlot> {
		storage.table_insert(self.spec.table, self.encode(row))
	}

	pub fn update(&self, storage: &dyn StorageEngine, slot: RowSlot, row: &WriteRow) -> Result<()> {
		storage.table_update(self.spec.table, slot, self.encode(row))
	}

	pub fn delete(&self, storage: &dyn StorageEngine, slot: RowSlot) -> Result<bool> {
		storage.table_delete(self.spec.table, slot)
	}

	/// Attempt the index insert for one declared index. `false` means a
	/// unique violation; the caller decides whether that aborts.
	pub fn index_insert(&self, storage: &dyn StorageEngine, ordinal: usize, row: &WriteRow, slot: RowSlot) -> Result<bool> {
		let index = self.index(ordinal)?;
		let key = encode_key(&self.key_values(ordinal, row)?);
		storage.index_insert(index.id, key, slot, index.unique)
	}

	pub fn index_delete(&self, storage: &dyn StorageEngine, ordinal: usize, row: &WriteRow, slot: RowSlot) -> Result<bool> {
		let index = self.index(ordinal)?;
		let key = encode_key(&self.key_values(ordinal, row)?);
		storage.index_delete(index.id, &key, slot)
	}

	fn index(&self, ordinal: usize) -> Result<&crate::runtime::IndexSpec> {
		self.spec
			.indexes
			.get(ordinal)
			.ok_or_else(|| error!(internal::internal(format!("index ordinal {ordinal} out of range"))))
	}

	fn key_values(&self, ordinal: usize, row: &WriteRow) -> Result<Vec<Value>> {
		let index = self.index(ordinal)?;
		index
			.key_columns
			.iter()
			.map(|&c| {
				row.values
					.get(c)
					.cloned()
					.ok_or_else(|| error!(internal::internal(format!("key column {c} out of range"))))
			})
			.collect()
	}
}

/// A row being assembled for insert or update, held as decoded values
/// so index keys can be built from it without re-reading the heap.
#[derive(Debug)]
pub struct WriteRow {
	values: Vec<Value>,
}

impl WriteRow {
	pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
		match self.values.get_mut(index) {
			Some(slot) => {
				*slot = value;
				Ok(())
			}
			None => Err(error!(internal::internal(format!("write column {index} out of range")))),
		}
	}

	pub fn get(&self, index: usize) -> Result<Value> {
		self.values
			.get(index)
			.cloned()
			.ok_or_else(|| error!(internal::internal(format!("write column {index} out of range"))))
	}
}

#[derive(Debug, Clone)]
struct AggState {
	count: i64,
	acc: Value,
}

impl AggState {
	fn new() -> Self {
		Self {
			count: 0,
			acc: Value::Undefined,
		}
	}
}

/// Grouped aggregation hash table. Group keys are the decoded values;
/// `Undefined` is a regular key (nulls group together).
#[derive(Debug)]
pub struct AggTable {
	spec: AggSpec,
	groups: HashMap<Vec<Value>, Vec<AggState>>,
}

impl AggTable {
	pub fn new(spec: &AggSpec) -> Self {
		Self {
			spec: spec.clone(),
			groups: HashMap::new(),
		}
	}

	pub fn group_count(&self) -> usize {
		self.groups.len()
	}

	pub fn key_count(&self) -> usize {
		self.spec.key_count
	}

	pub fn update(&mut self, keys: Vec<Value>, args: Vec<Value>) -> Result<()> {
		let states = self.groups.entry(keys).or_insert_with(|| vec![AggState::new(); self.spec.aggs.len()]);
		for ((func, state), arg) in self.spec.aggs.iter().zip(states.iter_mut()).zip(args) {
			accumulate(*func, state, &arg)?;
		}
		Ok(())
	}

	pub fn merge(&mut self, other: AggTable) -> Result<()> {
		for (keys, incoming) in other.groups {
			let states = self.groups.entry(keys).or_insert_with(|| vec![AggState::new(); self.spec.aggs.len()]);
			for ((func, state), src) in self.spec.aggs.iter().zip(states.iter_mut()).zip(incoming) {
				combine(*func, state, &src)?;
			}
		}
		Ok(())
	}

	/// Finalized output rows: group keys followed by one value per
	/// aggregate. Group order is unspecified. A global aggregation
	/// (no keys) always yields exactly one row, even over no input.
	pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
		if self.spec.key_count == 0 && self.groups.is_empty() {
			let empty = vec![AggState::new(); self.spec.aggs.len()];
			return Ok(vec![finalize_row(&self.spec, &[], &empty)?]);
		}
		self.groups.iter().map(|(keys, states)| finalize_row(&self.spec, keys, states)).collect()
	}
}

fn finalize_row(spec: &AggSpec, keys: &[Value], states: &[AggState]) -> Result<Vec<Value>> {
	let mut row = Vec::with_capacity(keys.len() + states.len());
	row.extend(keys.iter().cloned());
	for (func, state) in spec.aggs.iter().zip(states) {
		row.push(finalize(*func, state)?);
	}
	Ok(row)
}

fn accumulate(func: AggregateFunc, state: &mut AggState, arg: &Value) -> Result<()> {
	match func {
		AggregateFunc::CountStar => state.count += 1,
		AggregateFunc::Count => {
			if !arg.is_undefined() {
				state.count += 1;
			}
		}
		AggregateFunc::Sum | AggregateFunc::Avg => {
			if !arg.is_undefined() {
				state.count += 1;
				state.acc = add_to_sum(&state.acc, arg)?;
			}
		}
		AggregateFunc::Min => {
			if !arg.is_undefined() && better(arg, &state.acc, Ordering::Less)? {
				state.acc = arg.clone();
			}
		}
		AggregateFunc::Max => {
			if !arg.is_undefined() && better(arg, &state.acc, Ordering::Greater)? {
				state.acc = arg.clone();
			}
		}
	}
	Ok(())
}

fn combine(func: AggregateFunc, state: &mut AggState, src: &AggState) -> Result<()> {
	state.count += src.count;
	match func {
		AggregateFunc::Count | AggregateFunc::CountStar => {}
		AggregateFunc::Sum | AggregateFunc::Avg => {
			if !src.acc.is_undefined() {
				state.acc = add_to_sum(&state.acc, &src.acc)?;
			}
		}
		AggregateFunc::Min => {
			if !src.acc.is_undefined() && better(&src.acc, &state.acc, Ordering::Less)? {
				state.acc = src.acc.clone();
			}
		}
		AggregateFunc::Max => {
			if !src.acc.is_undefined() && better(&src.acc, &state.acc, Ordering::Greater)? {
				state.acc = src.acc.clone();
			}
		}
	}
	Ok(())
}

/// Integer sums accumulate in `Int8` so intermediate results do not
/// overflow narrow column types; float input switches the sum to
/// `Float8` from that point on.
fn add_to_sum(acc: &Value, arg: &Value) -> Result<Value> {
	if acc.is_undefined() {
		return Ok(match arg.as_i64() {
			Some(v) => Value::int8(v),
			None => arg.clone(),
		});
	}
	ops::binary(crate::plan::BinaryOp::Add, acc, arg)
}

fn better(candidate: &Value, current: &Value, wanted: Ordering) -> Result<bool> {
	if current.is_undefined() {
		return Ok(true);
	}
	Ok(ops::cmp_values(candidate, current)? == Some(wanted))
}

fn finalize(func: AggregateFunc, state: &AggState) -> Result<Value> {
	Ok(match func {
		AggregateFunc::Count | AggregateFunc::CountStar => Value::int8(state.count),
		AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max => state.acc.clone(),
		AggregateFunc::Avg => {
			if state.count == 0 {
				Value::Undefined
			} else {
				match state.acc.as_f64() {
					Some(sum) => Value::float8(sum / state.count as f64),
					None => Value::Undefined,
				}
			}
		}
	})
}

/// Join hash table: equi-key to payload rows. Rows with a null key are
/// never inserted and never probed successfully, matching SQL equality.
/// With an empty key set it degrades to a plain row buffer, which is
/// what the nested-loop strategy builds.
#[derive(Debug)]
pub struct JoinTable {
	key_count: usize,
	payload_width: usize,
	groups: HashMap<Vec<Value>, Vec<Vec<Value>>>,
}

impl JoinTable {
	pub fn new(spec: &JoinSpec) -> Self {
		Self {
			key_count: spec.key_count,
			payload_width: spec.payload_count,
			groups: HashMap::new(),
		}
	}

	pub fn key_count(&self) -> usize {
		self.key_count
	}

	pub fn payload_width(&self) -> usize {
		self.payload_width
	}

	pub fn insert(&mut self, keys: Vec<Value>, payload: Vec<Value>) {
		if keys.iter().any(Value::is_undefined) {
			return;
		}
		self.groups.entry(keys).or_default().push(payload);
	}

	pub fn merge(&mut self, other: JoinTable) {
		for (keys, rows) in other.groups {
			self.groups.entry(keys).or_default().extend(rows);
		}
	}

	pub fn probe(&self, keys: &[Value]) -> Vec<Vec<Value>> {
		if keys.iter().any(Value::is_undefined) {
			return Vec::new();
		}
		self.groups.get(keys).cloned().unwrap_or_default()
	}

	pub fn row_count(&self) -> usize {
		self.groups.values().map(Vec::len).sum()
	}
}

/// Row sorter. Insertion order is kept until [`Sorter::sort`]; the sort
/// is stable so equal keys keep their arrival order.
#[derive(Debug)]
pub struct Sorter {
	keys: Vec<(usize, SortDirection)>,
	rows: Vec<Vec<Value>>,
}

impl Sorter {
	pub fn new(spec: &SorterSpec) -> Self {
		Self {
			keys: spec.keys.clone(),
			rows: Vec::new(),
		}
	}

	pub fn insert(&mut self, row: Vec<Value>) {
		self.rows.push(row);
	}

	pub fn merge(&mut self, other: Sorter) {
		self.rows.extend(other.rows);
	}

	pub fn sort(&mut self) {
		let keys = self.keys.clone();
		self.rows.sort_by(|a, b| {
			for (col, direction) in &keys {
				let lhs = a.get(*col).unwrap_or(&Value::Undefined);
				let rhs = b.get(*col).unwrap_or(&Value::Undefined);
				let ord = ops::total_cmp(lhs, rhs);
				let ord = match direction {
					SortDirection::Ascending => ord,
					SortDirection::Descending => ord.reverse(),
				};
				if ord != Ordering::Equal {
					return ord;
				}
			}
			Ordering::Equal
		});
	}

	pub fn rows(&self) -> Vec<Vec<Value>> {
		self.rows.clone()
	}

	pub fn row_count(&self) -> usize {
		self.rows.len()
	}
}

/// Cursor over a snapshot of materialized rows.
#[derive(Debug)]
pub struct RowIter {
	rows: Vec<Vec<Value>>,
	next: usize,
}

impl RowIter {
	pub fn new(rows: Vec<Vec<Value>>) -> Self {
		Self {
			rows,
			next: 0,
		}
	}

	pub fn advance(&mut self) -> bool {
		if self.next < self.rows.len() {
			self.next += 1;
			true
		} else {
			false
		}
	}

	pub fn column(&self, index: usize) -> Result<Value> {
		let row = self
			.next
			.checked_sub(1)
			.and_then(|i| self.rows.get(i))
			.ok_or_else(|| error!(internal::internal("row iterator not positioned")))?;
		row.get(index)
			.cloned()
			.ok_or_else(|| error!(internal::internal(format!("row column {index} out of range"))))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn agg_spec(aggs: Vec<AggregateFunc>, key_count: usize) -> AggSpec {
		AggSpec {
			key_count,
			aggs,
		}
	}

	#[test]
	fn test_agg_skips_nulls_except_count_star() {
		let mut table = AggTable::new(&agg_spec(
			vec![AggregateFunc::CountStar, AggregateFunc::Count, AggregateFunc::Sum],
			0,
		));
		table.update(vec![], vec![Value::int8(0), Value::int4(1), Value::int4(10)]).unwrap();
		table.update(vec![], vec![Value::int8(0), Value::Undefined, Value::Undefined]).unwrap();

		let rows = table.rows().unwrap();
		assert_eq!(rows, vec![vec![Value::int8(2), Value::int8(1), Value::int8(10)]]);
	}

	#[test]
	fn test_global_agg_over_empty_input_yields_one_row() {
		let table = AggTable::new(&agg_spec(vec![AggregateFunc::CountStar, AggregateFunc::Sum], 0));
		let rows = table.rows().unwrap();
		assert_eq!(rows, vec![vec![Value::int8(0), Value::Undefined]]);
	}

	#[test]
	fn test_agg_merge_combines_partial_states() {
		let spec = agg_spec(vec![AggregateFunc::Sum, AggregateFunc::Min], 1);
		let mut a = AggTable::new(&spec);
		let mut b = AggTable::new(&spec);
		a.update(vec![Value::int4(1)], vec![Value::int4(5), Value::int4(5)]).unwrap();
		b.update(vec![Value::int4(1)], vec![Value::int4(7), Value::int4(3)]).unwrap();
		b.update(vec![Value::int4(2)], vec![Value::int4(1), Value::int4(1)]).unwrap();

		a.merge(b).unwrap();
		let mut rows = a.rows().unwrap();
		rows.sort_by(|x, y| ops::total_cmp(&x[0], &y[0]));
		assert_eq!(rows[0], vec![Value::int4(1), Value::int8(12), Value::int4(3)]);
		assert_eq!(rows[1], vec![Value::int4(2), Value::int8(1), Value::int4(1)]);
	}

	#[test]
	fn test_join_null_keys_never_match() {
		let mut table = JoinTable::new(&JoinSpec {
			key_count: 1,
			payload_count: 1,
		});
		table.insert(vec![Value::Undefined], vec![Value::int4(1)]);
		table.insert(vec![Value::int4(2)], vec![Value::int4(2)]);

		assert!(table.probe(&[Value::Undefined]).is_empty());
		assert_eq!(table.probe(&[Value::int4(2)]).len(), 1);
	}

	#[test]
	fn test_sorter_direction_and_stability() {
		let mut sorter = Sorter::new(&SorterSpec {
			keys: vec![(0, SortDirection::Descending)],
			width: 2,
		});
		sorter.insert(vec![Value::int4(1), Value::utf8("a")]);
		sorter.insert(vec![Value::int4(3), Value::utf8("b")]);
		sorter.insert(vec![Value::int4(3), Value::utf8("c")]);
		sorter.sort();

		let rows = sorter.rows();
		assert_eq!(rows[0], vec![Value::int4(3), Value::utf8("b")]);
		assert_eq!(rows[1], vec![Value::int4(3), Value::utf8("c")]);
		assert_eq!(rows[2], vec![Value::int4(1), Value::utf8("a")]);
	}

	#[test]
	fn test_row_iter_positions() {
		let mut iter = RowIter::new(vec![vec![Value::int4(1)], vec![Value::int4(2)]]);
		assert!(iter.column(0).is_err());
		assert!(iter.advance());
		assert_eq!(iter.column(0).unwrap(), Value::int4(1));
		assert!(iter.advance());
		assert!(!iter.advance());
	}
}
