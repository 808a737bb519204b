// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::{
	plan::{BinaryOp, UnaryOp},
	runtime::Builtin,
};

/// One-byte opcodes. Operands follow inline, little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
	/// End of function.
	Return = 0,
	/// Discard the top of stack.
	Pop = 1,
	/// `u16` constant pool index.
	PushConst = 2,
	/// `u16` variable slot.
	LoadVar = 3,
	StoreVar = 4,
	/// `u16` query-state slot.
	LoadQState = 5,
	StoreQState = 6,
	/// `u16` pipeline-state slot.
	LoadPState = 7,
	StorePState = 8,
	/// `u8` binary operator code.
	Binary = 9,
	/// `u8` unary operator code.
	Unary = 10,
	/// `u8` builtin code, `u8` argument count.
	Call = 11,
	/// `u32` absolute target.
	Jump = 12,
	/// Pop the condition; jump to the `u32` target unless truthy.
	JumpIfFalse = 13,
}

impl Opcode {
	pub fn from_u8(byte: u8) -> Option<Opcode> {
		Some(match byte {
			0 => Opcode::Return,
			1 => Opcode::Pop,
			2 => Opcode::PushConst,
			3 => Opcode::LoadVar,
			4 => Opcode::StoreVar,
			5 => Opcode::LoadQState,
			6 => Opcode::StoreQState,
			7 => Opcode::LoadPState,
			8 => Opcode::StorePState,
			9 => Opcode::Binary,
			10 => Opcode::Unary,
			11 => Opcode::Call,
			12 => Opcode::Jump,
			13 => Opcode::JumpIfFalse,
			_ => return None,
		})
	}

	pub fn mnemonic(&self) -> &'static str {
		match self {
			Opcode::Return => "return",
			Opcode::Pop => "pop",
			Opcode::PushConst => "push_const",
			Opcode::LoadVar => "load_var",
			Opcode::StoreVar => "store_var",
			Opcode::LoadQState => "load_qstate",
			Opcode::StoreQState => "store_qstate",
			Opcode::LoadPState => "load_pstate",
			Opcode::StorePState => "store_pstate",
			Opcode::Binary => "binary",
			Opcode::Unary => "unary",
			Opcode::Call => "call",
			Opcode::Jump => "jump",
			Opcode::JumpIfFalse => "jump_if_false",
		}
	}
}

/// Encoding tables for operator and builtin operands. Codes are table
/// positions, so the tables are append-only.
pub const BINARY_OPS: &[BinaryOp] = &[
	BinaryOp::Add,
	BinaryOp::Subtract,
	BinaryOp::Multiply,
	BinaryOp::Divide,
	BinaryOp::Remainder,
	BinaryOp::Equal,
	BinaryOp::NotEqual,
	BinaryOp::LessThan,
	BinaryOp::LessThanEqual,
	BinaryOp::GreaterThan,
	BinaryOp::GreaterThanEqual,
	BinaryOp::And,
	BinaryOp::Or,
];

pub const UNARY_OPS: &[UnaryOp] = &[UnaryOp::Not, UnaryOp::Negate];

pub const BUILTINS: &[Builtin] = &[
	Builtin::TableIterInit,
	Builtin::TableIterAdvance,
	Builtin::TableIterColumn,
	Builtin::TableIterSlot,
	Builtin::InserterInit,
	Builtin::RowAcquire,
	Builtin::RowSet,
	Builtin::RowGet,
	Builtin::RowCheckNotNull,
	Builtin::TableInsert,
	Builtin::TableUpdate,
	Builtin::TableDelete,
	Builtin::IndexInsert,
	Builtin::IndexDelete,
	Builtin::AbortUniqueViolation,
	Builtin::AggInit,
	Builtin::AggUpdate,
	Builtin::AggMerge,
	Builtin::AggIterInit,
	Builtin::JoinInit,
	Builtin::JoinInsert,
	Builtin::JoinMerge,
	Builtin::JoinProbe,
	Builtin::SorterInit,
	Builtin::SorterInsert,
	Builtin::SorterMerge,
	Builtin::SorterSort,
	Builtin::SorterIterInit,
	Builtin::RowIterAdvance,
	Builtin::RowIterColumn,
	Builtin::ResultEmit,
	Builtin::RowsAffectedAdd,
	Builtin::FeatureRecord,
	Builtin::ObjectCount,
	Builtin::HandleFree,
];

pub fn binary_code(op: BinaryOp) -> u8 {
	BINARY_OPS.iter().position(|o| *o == op).unwrap_or(0) as u8
}

pub fn unary_code(op: UnaryOp) -> u8 {
	UNARY_OPS.iter().position(|o| *o == op).unwrap_or(0) as u8
}

pub fn builtin_code(builtin: Builtin) -> u8 {
	BUILTINS.iter().position(|b| *b == builtin).unwrap_or(0) as u8
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_opcode_roundtrip() {
		for byte in 0..=13u8 {
			let op = Opcode::from_u8(byte).unwrap();
			assert_eq!(op as u8, byte);
		}
		assert!(Opcode::from_u8(200).is_none());
	}

	#[test]
	fn test_builtin_codes_roundtrip() {
		for (i, builtin) in BUILTINS.iter().enumerate() {
			assert_eq!(builtin_code(*builtin) as usize, i);
		}
	}
}
