// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifies a table in the catalog and the storage engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Identifies a secondary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub u64);

/// Physical position of a row: block number plus position inside the
/// block. Blocks are the unit parallel scans partition over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowSlot {
	pub block: u32,
	pub row: u32,
}

impl Display for TableId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "table#{}", self.0)
	}
}

impl Display for IndexId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "index#{}", self.0)
	}
}

impl Display for RowSlot {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.block, self.row)
	}
}
