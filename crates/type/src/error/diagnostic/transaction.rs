// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

/// The transaction is marked must-abort; no further mutation or commit
/// is permitted until the client rolls back.
pub fn must_abort() -> Diagnostic {
	Diagnostic {
		code: "TXN_001".to_string(),
		message: "transaction is marked must-abort".to_string(),
		label: None,
		help: Some("roll back the transaction and retry".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// A commit was attempted on a must-abort transaction.
pub fn commit_rejected() -> Diagnostic {
	Diagnostic {
		code: "TXN_002".to_string(),
		message: "commit refused: transaction is marked must-abort".to_string(),
		label: None,
		help: Some("roll back the transaction".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}
