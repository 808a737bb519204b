// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::error::diagnostic::Diagnostic;

pub fn table_not_found(table: u64) -> Diagnostic {
	Diagnostic {
		code: "CATALOG_001".to_string(),
		message: format!("table with id {} not found", table),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

pub fn index_not_found(index: u64) -> Diagnostic {
	Diagnostic {
		code: "CATALOG_002".to_string(),
		message: format!("index with id {} not found", index),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

pub fn column_out_of_range(table: u64, column: usize) -> Diagnostic {
	Diagnostic {
		code: "CATALOG_003".to_string(),
		message: format!("column index {} out of range for table {}", column, table),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}
