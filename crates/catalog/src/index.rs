// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use serde::{Deserialize, Serialize};
use smelt_core::{IndexId, TableId};

/// A declared secondary index: which table columns form the key, and
/// whether duplicates are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
	pub id: IndexId,
	pub name: String,
	pub table: TableId,
	/// Field indexes into the table's row layout, in key order.
	pub key_columns: Vec<usize>,
	pub unique: bool,
}
