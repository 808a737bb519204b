// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::Result;

use crate::{EncodedKey, IndexId, Row, RowSlot, TableId};

/// The storage/index ABI. These calls are the only path through which
/// query execution reads or mutates persistent state.
///
/// All methods take `&self`: implementations use interior locking so a
/// parallel pipeline can scan while the engine holds one shared handle.
pub trait StorageEngine: Send + Sync {
	fn table_insert(&self, table: TableId, row: Row) -> Result<RowSlot>;

	fn table_update(&self, table: TableId, slot: RowSlot, row: Row) -> Result<()>;

	/// Returns false when the slot was already deleted.
	fn table_delete(&self, table: TableId, slot: RowSlot) -> Result<bool>;

	fn table_row(&self, table: TableId, slot: RowSlot) -> Result<Option<Row>>;

	/// Number of blocks currently backing the table. Parallel scans
	/// partition `0..block_count` into contiguous ranges.
	fn block_count(&self, table: TableId) -> Result<u32>;

	/// Live rows of one block, in slot order.
	fn scan_block(&self, table: TableId, block: u32) -> Result<Vec<(RowSlot, Row)>>;

	/// Insert into a secondary index. Returns `false` iff `unique` is
	/// set and the key is already present; the caller decides whether
	/// that aborts the transaction.
	fn index_insert(&self, index: IndexId, key: EncodedKey, slot: RowSlot, unique: bool) -> Result<bool>;

	fn index_delete(&self, index: IndexId, key: &EncodedKey, slot: RowSlot) -> Result<bool>;

	fn index_lookup(&self, index: IndexId, key: &EncodedKey) -> Result<Vec<RowSlot>>;
}

/// The transaction handle the execution context carries. Undo/redo is
/// the concern of an external transaction manager; this layer only
/// tracks the must-abort flag and rows-affected accounting.
pub trait Transaction: Send + Sync {
	fn storage(&self) -> &dyn StorageEngine;

	/// Mark the transaction as must-abort. Idempotent. After this, no
	/// further mutation or commit is permitted.
	fn mark_must_abort(&self);

	fn is_must_abort(&self) -> bool;

	fn add_rows_affected(&self, n: u64);

	fn rows_affected(&self) -> u64;

	/// Commit, refusing with `TXN_002` when the transaction is marked
	/// must-abort.
	fn commit(&self) -> Result<()>;
}
