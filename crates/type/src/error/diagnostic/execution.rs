// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

/// The client cancelled the query. Raised at a pipeline boundary, never
/// mid-row, so partial batches already delivered stay consistent.
pub fn cancelled() -> Diagnostic {
	Diagnostic {
		code: "EXEC_001".to_string(),
		message: "query execution cancelled".to_string(),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// An explain dump could not be parsed back.
pub fn malformed_explain(message: impl Into<String>) -> Diagnostic {
	Diagnostic {
		code: "EXEC_002".to_string(),
		message: format!("malformed explain output: {}", message.into()),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}
