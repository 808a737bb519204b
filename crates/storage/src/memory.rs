// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use smelt_core::{EncodedKey, IndexId, Row, RowSlot, StorageEngine, TableId};
use smelt_type::{Result, diagnostic::catalog, error};
use tracing::trace;

/// Rows per heap block. Blocks are the partitioning unit for parallel
/// scans, so this stays small enough that modest tables still split.
pub const BLOCK_ROWS: usize = 1024;

#[derive(Default)]
struct TableHeap {
	/// Blocks of row slots; `None` marks a deleted row.
	blocks: Vec<Vec<Option<Row>>>,
}

impl TableHeap {
	fn insert(&mut self, row: Row) -> RowSlot {
		if self.blocks.last().map(|b| b.len() >= BLOCK_ROWS).unwrap_or(true) {
			self.blocks.push(Vec::with_capacity(BLOCK_ROWS));
		}
		let block = self.blocks.len() - 1;
		let slot = self.blocks[block].len();
		self.blocks[block].push(Some(row));
		RowSlot {
			block: block as u32,
			row: slot as u32,
		}
	}

	fn get(&self, slot: RowSlot) -> Option<&Row> {
		self.blocks.get(slot.block as usize)?.get(slot.row as usize)?.as_ref()
	}

	fn get_mut(&mut self, slot: RowSlot) -> Option<&mut Option<Row>> {
		self.blocks.get_mut(slot.block as usize)?.get_mut(slot.row as usize)
	}
}

/// An in-memory storage engine: table heaps plus BTree secondary
/// indexes keyed by encoded key bytes. All state sits behind one
/// RwLock per concern so parallel scans only take read locks.
pub struct MemoryStorage {
	heaps: RwLock<HashMap<TableId, TableHeap>>,
	indexes: RwLock<HashMap<IndexId, BTreeMap<EncodedKey, Vec<RowSlot>>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			heaps: RwLock::new(HashMap::new()),
			indexes: RwLock::new(HashMap::new()),
		}
	}

	/// Register an empty heap for a table. Idempotent.
	pub fn register_table(&self, table: TableId) {
		self.heaps.write().entry(table).or_default();
	}

	pub fn register_index(&self, index: IndexId) {
		self.indexes.write().entry(index).or_default();
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl StorageEngine for MemoryStorage {
	fn table_insert(&self, table: TableId, row: Row) -> Result<RowSlot> {
		let mut heaps = self.heaps.write();
		let heap = heaps.get_mut(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		let slot = heap.insert(row);
		trace!(table = table.0, %slot, "table insert");
		Ok(slot)
	}

	fn table_update(&self, table: TableId, slot: RowSlot, row: Row) -> Result<()> {
		let mut heaps = self.heaps.write();
		let heap = heaps.get_mut(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		match heap.get_mut(slot) {
			Some(entry @ Some(_)) => {
				*entry = Some(row);
				Ok(())
			}
			_ => Err(error!(smelt_type::diagnostic::internal::internal(format!(
				"update of non-existent slot {} in {}",
				slot, table
			)))),
		}
	}

	fn table_delete(&self, table: TableId, slot: RowSlot) -> Result<bool> {
		let mut heaps = self.heaps.write();
		let heap = heaps.get_mut(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		match heap.get_mut(slot) {
			Some(entry @ Some(_)) => {
				*entry = None;
				trace!(table = table.0, %slot, "table delete");
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	fn table_row(&self, table: TableId, slot: RowSlot) -> Result<Option<Row>> {
		let heaps = self.heaps.read();
		let heap = heaps.get(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		Ok(heap.get(slot).cloned())
	}

	fn block_count(&self, table: TableId) -> Result<u32> {
		let heaps = self.heaps.read();
		let heap = heaps.get(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		Ok(heap.blocks.len() as u32)
	}

	fn scan_block(&self, table: TableId, block: u32) -> Result<Vec<(RowSlot, Row)>> {
		let heaps = self.heaps.read();
		let heap = heaps.get(&table).ok_or_else(|| error!(catalog::table_not_found(table.0)))?;
		let Some(rows) = heap.blocks.get(block as usize) else {
			return Ok(Vec::new());
		};
		Ok(rows.iter()
			.enumerate()
			.filter_map(|(i, row)| {
				row.as_ref().map(|r| {
					(RowSlot {
						block,
						row: i as u32,
					}, r.clone())
				})
			})
			.collect())
	}

	fn index_insert(&self, index: IndexId, key: EncodedKey, slot: RowSlot, unique: bool) -> Result<bool> {
		let mut indexes = self.indexes.write();
		let tree = indexes.get_mut(&index).ok_or_else(|| error!(catalog::index_not_found(index.0)))?;
		let slots = tree.entry(key).or_default();
		if unique && !slots.is_empty() {
			return Ok(false);
		}
		slots.push(slot);
		Ok(true)
	}

	fn index_delete(&self, index: IndexId, key: &EncodedKey, slot: RowSlot) -> Result<bool> {
		let mut indexes = self.indexes.write();
		let tree = indexes.get_mut(&index).ok_or_else(|| error!(catalog::index_not_found(index.0)))?;
		let Some(slots) = tree.get_mut(key) else {
			return Ok(false);
		};
		let before = slots.len();
		slots.retain(|s| s != &slot);
		let removed = slots.len() < before;
		if slots.is_empty() {
			tree.remove(key);
		}
		Ok(removed)
	}

	fn index_lookup(&self, index: IndexId, key: &EncodedKey) -> Result<Vec<RowSlot>> {
		let indexes = self.indexes.read();
		let tree = indexes.get(&index).ok_or_else(|| error!(catalog::index_not_found(index.0)))?;
		Ok(tree.get(key).cloned().unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use smelt_core::encode_key;
	use smelt_type::{Type, Value};

	use super::*;

	fn row_of(v: i32) -> Row {
		let layout = smelt_core::RowLayout::new(&[Type::Int4]);
		let mut row = layout.allocate_row();
		layout.set_value(&mut row, 0, &Value::int4(v));
		row
	}

	#[test]
	fn test_insert_then_scan() {
		let storage = MemoryStorage::new();
		let table = TableId(1);
		storage.register_table(table);

		storage.table_insert(table, row_of(1)).unwrap();
		storage.table_insert(table, row_of(2)).unwrap();

		assert_eq!(storage.block_count(table).unwrap(), 1);
		assert_eq!(storage.scan_block(table, 0).unwrap().len(), 2);
	}

	#[test]
	fn test_delete_skipped_by_scan() {
		let storage = MemoryStorage::new();
		let table = TableId(1);
		storage.register_table(table);

		let slot = storage.table_insert(table, row_of(1)).unwrap();
		storage.table_insert(table, row_of(2)).unwrap();
		assert!(storage.table_delete(table, slot).unwrap());
		assert!(!storage.table_delete(table, slot).unwrap());

		assert_eq!(storage.scan_block(table, 0).unwrap().len(), 1);
	}

	#[test]
	fn test_unique_index_rejects_duplicate() {
		let storage = MemoryStorage::new();
		let index = IndexId(7);
		storage.register_index(index);

		let key = encode_key(&[Value::int4(4)]);
		let a = RowSlot {
			block: 0,
			row: 0,
		};
		let b = RowSlot {
			block: 0,
			row: 1,
		};

		assert!(storage.index_insert(index, key.clone(), a, true).unwrap());
		assert!(!storage.index_insert(index, key.clone(), b, true).unwrap());
		assert_eq!(storage.index_lookup(index, &key).unwrap(), vec![a]);
	}

	#[test]
	fn test_non_unique_index_accepts_duplicates() {
		let storage = MemoryStorage::new();
		let index = IndexId(7);
		storage.register_index(index);

		let key = encode_key(&[Value::int4(4)]);
		for i in 0..3 {
			let slot = RowSlot {
				block: 0,
				row: i,
			};
			assert!(storage.index_insert(index, key.clone(), slot, false).unwrap());
		}
		assert_eq!(storage.index_lookup(index, &key).unwrap().len(), 3);
	}
}
