// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::{
	collections::HashMap,
	sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use smelt_core::{IndexId, TableId};
use smelt_type::{Result, Type, diagnostic::catalog, error};

use crate::{ColumnDef, IndexDef, TableDef};

/// In-memory catalog accessor. Lookups are snapshot reads as far as the
/// engine is concerned; the engine never writes here.
pub struct Catalog {
	tables: RwLock<HashMap<TableId, TableDef>>,
	indexes: RwLock<HashMap<IndexId, IndexDef>>,
	next_id: AtomicU64,
}

impl Catalog {
	pub fn new() -> Self {
		Self {
			tables: RwLock::new(HashMap::new()),
			indexes: RwLock::new(HashMap::new()),
			next_id: AtomicU64::new(1),
		}
	}

	/// Create a table from `(name, type, nullable)` column triples.
	pub fn create_table(&self, name: &str, columns: &[(&str, Type, bool)]) -> TableDef {
		let id = TableId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let columns = columns
			.iter()
			.enumerate()
			.map(|(index, (name, ty, nullable))| ColumnDef {
				name: name.to_string(),
				ty: *ty,
				nullable: *nullable,
				index,
			})
			.collect();
		let def = TableDef {
			id,
			name: name.to_string(),
			columns,
		};
		self.tables.write().insert(id, def.clone());
		def
	}

	pub fn create_index(&self, name: &str, table: TableId, key_columns: &[usize], unique: bool) -> IndexDef {
		let id = IndexId(self.next_id.fetch_add(1, Ordering::Relaxed));
		let def = IndexDef {
			id,
			name: name.to_string(),
			table,
			key_columns: key_columns.to_vec(),
			unique,
		};
		self.indexes.write().insert(id, def.clone());
		def
	}

	pub fn table(&self, id: TableId) -> Result<TableDef> {
		self.tables.read().get(&id).cloned().ok_or_else(|| error!(catalog::table_not_found(id.0)))
	}

	pub fn index(&self, id: IndexId) -> Result<IndexDef> {
		self.indexes.read().get(&id).cloned().ok_or_else(|| error!(catalog::index_not_found(id.0)))
	}

	/// All indexes declared on a table, in id order so translation is
	/// deterministic.
	pub fn indexes_of(&self, table: TableId) -> Vec<IndexDef> {
		let mut indexes: Vec<_> =
			self.indexes.read().values().filter(|i| i.table == table).cloned().collect();
		indexes.sort_by_key(|i| i.id);
		indexes
	}
}

impl Default for Catalog {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use smelt_type::Type;

	use super::*;

	#[test]
	fn test_create_and_lookup_table() {
		let catalog = Catalog::new();
		let table = catalog.create_table("users", &[("id", Type::Int4, false), ("name", Type::Utf8, true)]);

		let found = catalog.table(table.id).unwrap();
		assert_eq!(found.name, "users");
		assert_eq!(found.columns.len(), 2);
		assert_eq!(found.columns[1].index, 1);
	}

	#[test]
	fn test_missing_table_is_catalog_error() {
		let catalog = Catalog::new();
		let err = catalog.table(smelt_core::TableId(99)).unwrap_err();
		assert_eq!(err.code(), "CATALOG_001");
	}

	#[test]
	fn test_indexes_of_sorted_by_id() {
		let catalog = Catalog::new();
		let table = catalog.create_table("t", &[("a", Type::Int4, false)]);
		let b = catalog.create_index("t_b", table.id, &[0], false);
		let a = catalog.create_index("t_a", table.id, &[0], true);

		let indexes = catalog.indexes_of(table.id);
		assert_eq!(indexes.len(), 2);
		assert!(indexes[0].id < indexes[1].id);
		assert_eq!(indexes[0].id, b.id);
		assert_eq!(indexes[1].id, a.id);
	}
}
