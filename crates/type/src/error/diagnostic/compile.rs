// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

/// The plan contains an operator or shape the translators do not
/// support. Reported before any row is produced.
pub fn unsupported_plan(message: impl Into<String>) -> Diagnostic {
	Diagnostic {
		code: "COMPILE_001".to_string(),
		message: format!("unsupported plan: {}", message.into()),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// An expression kind the translators cannot lower.
pub fn unsupported_expression(message: impl Into<String>) -> Diagnostic {
	Diagnostic {
		code: "COMPILE_002".to_string(),
		message: format!("unsupported expression: {}", message.into()),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// Lowering the IR to bytecode failed. Kept distinct from runtime SQL
/// errors: no row has been produced and the transaction is untouched.
pub fn codegen_failed(message: impl Into<String>) -> Diagnostic {
	Diagnostic {
		code: "COMPILE_003".to_string(),
		message: format!("code generation failed: {}", message.into()),
		label: None,
		help: Some("the query can still be run in interpreted mode".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}
