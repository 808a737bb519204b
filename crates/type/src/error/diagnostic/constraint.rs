// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

/// A unique index rejected a duplicate key. The owning transaction is
/// marked must-abort by the caller before this surfaces to the client.
pub fn unique_violation(table: &str, index: &str) -> Diagnostic {
	Diagnostic {
		code: "CONSTRAINT_001".to_string(),
		message: format!("unique constraint violated by index '{}' on table '{}'", index, table),
		label: Some("duplicate key".to_string()),
		help: Some("the transaction must be rolled back".to_string()),
		notes: vec!["rows inserted before the violation remain pending in the aborted transaction"
			.to_string()],
		origin: None,
		cause: None,
	}
}

/// A non-nullable column received an undefined value.
pub fn not_null_violation(table: &str, column: &str) -> Diagnostic {
	Diagnostic {
		code: "CONSTRAINT_002".to_string(),
		message: format!("column '{}' of table '{}' does not accept undefined values", column, table),
		label: None,
		help: Some("provide a value for the column or declare it nullable".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}
