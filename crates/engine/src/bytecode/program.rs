// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::Value;

/// A lowered function body: flat code plus frame layout.
#[derive(Clone, Debug)]
pub struct CompiledFunc {
	pub name: String,
	pub params: usize,
	pub var_count: usize,
	pub code: Vec<u8>,
}

/// A fully lowered module. Function ids match the IR module the program
/// was lowered from, so the pipeline driver can swap backends between
/// pipelines without retranslating anything.
#[derive(Clone, Debug, Default)]
pub struct CompiledProgram {
	pub constants: Vec<Value>,
	pub funcs: Vec<CompiledFunc>,
}

impl CompiledProgram {
	pub fn code_size(&self) -> usize {
		self.funcs.iter().map(|f| f.code.len()).sum()
	}
}
