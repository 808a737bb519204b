// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Fixtures shared by the engine's unit and integration tests.

use std::sync::Arc;

use parking_lot::Mutex;
use smelt_catalog::{Catalog, IndexDef, TableDef};
use smelt_core::{RowLayout, StorageEngine, Transaction, encode_key};
use smelt_storage::{MemoryStorage, StandardTransaction};
use smelt_type::{Result, Type, Value};

use crate::{
	exec::{ExecutionContext, ExecutionMode},
	plan::PhysicalPlan,
	settings::EngineSettings,
	translate::compile,
};

/// A catalog plus storage pair wired together, with helpers to seed
/// tables and run plans end to end.
pub struct TestDb {
	pub catalog: Catalog,
	pub storage: Arc<MemoryStorage>,
}

impl TestDb {
	pub fn new() -> Self {
		Self {
			catalog: Catalog::new(),
			storage: Arc::new(MemoryStorage::new()),
		}
	}

	pub fn create_table(&self, name: &str, columns: &[(&str, Type, bool)]) -> TableDef {
		let def = self.catalog.create_table(name, columns);
		self.storage.register_table(def.id);
		def
	}

	pub fn create_index(&self, name: &str, table: &TableDef, key_columns: &[usize], unique: bool) -> IndexDef {
		let def = self.catalog.create_index(name, table.id, key_columns, unique);
		self.storage.register_index(def.id);
		def
	}

	/// Insert rows directly into storage, maintaining any declared
	/// indexes, bypassing the engine's write path.
	pub fn seed(&self, table: &TableDef, rows: &[Vec<Value>]) -> Result<()> {
		let layout = RowLayout::new(&table.column_types());
		let indexes = self.catalog.indexes_of(table.id);
		for values in rows {
			let mut row = layout.allocate_row();
			for (i, value) in values.iter().enumerate() {
				layout.set_value(&mut row, i, value);
			}
			let slot = self.storage.table_insert(table.id, row)?;
			for index in &indexes {
				let key: Vec<Value> = index.key_columns.iter().map(|c| values[*c].clone()).collect();
				self.storage.index_insert(index.id, encode_key(&key), slot, index.unique)?;
			}
		}
		Ok(())
	}

	pub fn transaction(&self) -> Arc<StandardTransaction> {
		Arc::new(StandardTransaction::new(Arc::clone(&self.storage)))
	}

	/// Compile and run a plan in one shot, collecting emitted rows.
	/// Returns the rows plus the transaction's rows-affected count.
	pub fn run(
		&self,
		plan: &PhysicalPlan,
		settings: &EngineSettings,
		mode: ExecutionMode,
	) -> Result<(Vec<Vec<Value>>, u64)> {
		let txn = self.transaction();
		let affected = self.run_in(plan, settings, mode, Arc::clone(&txn) as Arc<dyn Transaction>)?;
		txn.commit()?;
		Ok(affected)
	}

	/// Like [`TestDb::run`] but against a caller-provided transaction,
	/// for tests that inspect the transaction afterwards.
	pub fn run_in(
		&self,
		plan: &PhysicalPlan,
		settings: &EngineSettings,
		mode: ExecutionMode,
		txn: Arc<dyn Transaction>,
	) -> Result<(Vec<Vec<Value>>, u64)> {
		let query = compile(plan, &self.catalog, settings)?;
		let rows = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&rows);
		let mut ctx = ExecutionContext::new(txn, settings.clone()).on_batch(move |batch| {
			sink.lock().extend(batch);
		});
		let affected = query.run(&mut ctx, mode)?;
		let rows = std::mem::take(&mut *rows.lock());
		Ok((rows, affected))
	}
}

impl Default for TestDb {
	fn default() -> Self {
		Self::new()
	}
}

/// Rows of int8 values, the common fixture shape.
pub fn int8_rows(rows: &[&[i64]]) -> Vec<Vec<Value>> {
	rows.iter().map(|r| r.iter().map(|v| Value::int8(*v)).collect()).collect()
}
