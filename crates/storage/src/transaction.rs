// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicU64, Ordering},
};

use smelt_core::{StorageEngine, Transaction};
use smelt_type::{Result, diagnostic::transaction, return_error};
use tracing::debug;

use crate::MemoryStorage;

/// The transaction handle carried by the execution context.
///
/// Undo of already-applied mutations is the enclosing transaction
/// manager's job (external collaborator); this handle only tracks the
/// must-abort flag and rows-affected accounting, and refuses commit
/// once the flag is set.
pub struct StandardTransaction {
	storage: Arc<MemoryStorage>,
	must_abort: AtomicBool,
	rows_affected: AtomicU64,
}

impl StandardTransaction {
	pub fn new(storage: Arc<MemoryStorage>) -> Self {
		Self {
			storage,
			must_abort: AtomicBool::new(false),
			rows_affected: AtomicU64::new(0),
		}
	}
}

impl Transaction for StandardTransaction {
	fn storage(&self) -> &dyn StorageEngine {
		self.storage.as_ref()
	}

	fn mark_must_abort(&self) {
		if !self.must_abort.swap(true, Ordering::SeqCst) {
			debug!("transaction marked must-abort");
		}
	}

	fn is_must_abort(&self) -> bool {
		self.must_abort.load(Ordering::SeqCst)
	}

	fn add_rows_affected(&self, n: u64) {
		self.rows_affected.fetch_add(n, Ordering::Relaxed);
	}

	fn rows_affected(&self) -> u64 {
		self.rows_affected.load(Ordering::Relaxed)
	}

	fn commit(&self) -> Result<()> {
		if self.is_must_abort() {
			return_error!(transaction::commit_rejected());
		}
		// the in-memory engine applies mutations eagerly, so commit
		// is an accounting no-op here
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_commit_refused_after_must_abort() {
		let txn = StandardTransaction::new(Arc::new(MemoryStorage::new()));
		assert!(txn.commit().is_ok());

		txn.mark_must_abort();
		let err = txn.commit().unwrap_err();
		assert_eq!(err.code(), "TXN_002");
	}

	#[test]
	fn test_rows_affected_accumulates() {
		let txn = StandardTransaction::new(Arc::new(MemoryStorage::new()));
		txn.add_rows_affected(2);
		txn.add_rows_affected(3);
		assert_eq!(txn.rows_affected(), 5);
	}
}
