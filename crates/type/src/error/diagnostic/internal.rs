// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

/// A supposedly unreachable state was reached: an upstream contract
/// (binder, optimizer) was breached. Not user-correctable.
pub fn internal(message: impl Into<String>) -> Diagnostic {
	Diagnostic {
		code: "INTERNAL_001".to_string(),
		message: message.into(),
		label: Some("this is a bug, not a problem with the query".to_string()),
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}
