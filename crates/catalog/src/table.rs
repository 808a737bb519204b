// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use serde::{Deserialize, Serialize};
use smelt_core::{RowLayout, TableId};
use smelt_type::Type;

/// One column of a table. `index` is the field position inside the
/// table's row layout; translators address columns exclusively by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
	pub name: String,
	pub ty: Type,
	pub nullable: bool,
	pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
	pub id: TableId,
	pub name: String,
	pub columns: Vec<ColumnDef>,
}

impl TableDef {
	pub fn column_types(&self) -> Vec<Type> {
		self.columns.iter().map(|c| c.ty).collect()
	}

	/// The row layout every projected row of this table follows.
	pub fn layout(&self) -> RowLayout {
		RowLayout::new(&self.column_types())
	}

	pub fn column(&self, index: usize) -> Option<&ColumnDef> {
		self.columns.get(index)
	}
}
