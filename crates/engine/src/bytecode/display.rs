// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::Write;

use crate::bytecode::{
	CompiledProgram, Opcode,
	opcode::{BINARY_OPS, BUILTINS, UNARY_OPS},
};

/// Render a lowered program as one instruction per line, constants and
/// builtin names resolved inline.
pub fn disassemble(program: &CompiledProgram) -> String {
	let mut out = String::new();
	for func in &program.funcs {
		let _ = writeln!(out, "fn {} (params={}, vars={}, {} bytes)", func.name, func.params, func.var_count, func.code.len());
		let code = &func.code;
		let mut pc = 0usize;
		while pc < code.len() {
			let at = pc;
			let Some(opcode) = Opcode::from_u8(code[pc]) else {
				let _ = writeln!(out, "  {at:04}  .byte {:#04x}", code[pc]);
				pc += 1;
				continue;
			};
			pc += 1;
			let _ = write!(out, "  {at:04}  {}", opcode.mnemonic());
			match opcode {
				Opcode::Return | Opcode::Pop => {}
				Opcode::PushConst => {
					let idx = operand_u16(code, &mut pc);
					match program.constants.get(idx as usize) {
						Some(value) => {
							let _ = write!(out, " {idx} ; {value}");
						}
						None => {
							let _ = write!(out, " {idx} ; ?");
						}
					}
				}
				Opcode::LoadVar | Opcode::StoreVar => {
					let _ = write!(out, " v{}", operand_u16(code, &mut pc));
				}
				Opcode::LoadQState | Opcode::StoreQState => {
					let _ = write!(out, " qstate[{}]", operand_u16(code, &mut pc));
				}
				Opcode::LoadPState | Opcode::StorePState => {
					let _ = write!(out, " pstate[{}]", operand_u16(code, &mut pc));
				}
				Opcode::Binary => {
					let idx = operand_u8(code, &mut pc) as usize;
					match BINARY_OPS.get(idx) {
						Some(op) => {
							let _ = write!(out, " {op}");
						}
						None => {
							let _ = write!(out, " ?{idx}");
						}
					}
				}
				Opcode::Unary => {
					let idx = operand_u8(code, &mut pc) as usize;
					match UNARY_OPS.get(idx) {
						Some(op) => {
							let _ = write!(out, " {op}");
						}
						None => {
							let _ = write!(out, " ?{idx}");
						}
					}
				}
				Opcode::Call => {
					let idx = operand_u8(code, &mut pc) as usize;
					let argc = operand_u8(code, &mut pc);
					match BUILTINS.get(idx) {
						Some(builtin) => {
							let _ = write!(out, " @{builtin} argc={argc}");
						}
						None => {
							let _ = write!(out, " ?{idx} argc={argc}");
						}
					}
				}
				Opcode::Jump | Opcode::JumpIfFalse => {
					let _ = write!(out, " -> {:04}", operand_u32(code, &mut pc));
				}
			}
			out.push('\n');
		}
	}
	out
}

fn operand_u8(code: &[u8], pc: &mut usize) -> u8 {
	let v = code.get(*pc).copied().unwrap_or(0);
	*pc += 1;
	v
}

fn operand_u16(code: &[u8], pc: &mut usize) -> u16 {
	let v = code
		.get(*pc..*pc + 2)
		.and_then(|s| <[u8; 2]>::try_from(s).ok())
		.map(u16::from_le_bytes)
		.unwrap_or(0);
	*pc += 2;
	v
}

fn operand_u32(code: &[u8], pc: &mut usize) -> u32 {
	let v = code
		.get(*pc..*pc + 4)
		.and_then(|s| <[u8; 4]>::try_from(s).ok())
		.map(u32::from_le_bytes)
		.unwrap_or(0);
	*pc += 4;
	v
}

#[cfg(test)]
mod tests {
	use smelt_type::Type;

	use super::*;
	use crate::{
		bytecode::lower,
		ir::{Expr, FuncBuilder, Module},
		pipeline::SlotType,
		plan::BinaryOp,
	};

	#[test]
	fn test_disassembly_resolves_constants_and_ops() {
		let mut b = FuncBuilder::new("f");
		let v = b.declare("v", SlotType::Scalar(Type::Int8));
		b.assign(v, Expr::binary(BinaryOp::Add, Expr::int8(40), Expr::int8(2)));
		b.return_();

		let mut module = Module::default();
		module.add_func(b.finish());
		let text = disassemble(&lower(&module).unwrap());

		assert!(text.contains("fn f"));
		assert!(text.contains("push_const 0 ; 40"));
		assert!(text.contains("binary +"));
		assert!(text.contains("store_var v0"));
	}
}
