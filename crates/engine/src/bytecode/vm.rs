// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::sync::Arc;

use smelt_type::{Result, diagnostic::internal, error};

use crate::{
	bytecode::{
		CompiledProgram, Opcode,
		opcode::{BINARY_OPS, BUILTINS, UNARY_OPS},
	},
	exec::Backend,
	ir::FuncId,
	runtime::{self, RtValue, RuntimeCtx},
};

/// Stack-machine executor for lowered programs.
pub struct BytecodeVm {
	program: Arc<CompiledProgram>,
}

impl BytecodeVm {
	pub fn new(program: Arc<CompiledProgram>) -> Self {
		Self {
			program,
		}
	}
}

fn read_u16(code: &[u8], pc: &mut usize) -> Result<u16> {
	let bytes: [u8; 2] = code
		.get(*pc..*pc + 2)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| error!(internal::internal("truncated bytecode operand")))?;
	*pc += 2;
	Ok(u16::from_le_bytes(bytes))
}

fn read_u32(code: &[u8], pc: &mut usize) -> Result<u32> {
	let bytes: [u8; 4] = code
		.get(*pc..*pc + 4)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| error!(internal::internal("truncated bytecode operand")))?;
	*pc += 4;
	Ok(u32::from_le_bytes(bytes))
}

fn read_u8(code: &[u8], pc: &mut usize) -> Result<u8> {
	let byte = code.get(*pc).copied().ok_or_else(|| error!(internal::internal("truncated bytecode operand")))?;
	*pc += 1;
	Ok(byte)
}

impl Backend for BytecodeVm {
	fn name(&self) -> &'static str {
		"compiled"
	}

	fn run(&self, func: FuncId, args: &[RtValue], ctx: &mut RuntimeCtx<'_>) -> Result<()> {
		let func = self
			.program
			.funcs
			.get(func.0)
			.ok_or_else(|| error!(internal::internal(format!("function id {} out of range", func.0))))?;
		if args.len() != func.params {
			return Err(error!(internal::internal(format!(
				"function {} expects {} arguments, got {}",
				func.name,
				func.params,
				args.len()
			))));
		}

		let code = &func.code;
		let mut vars = vec![RtValue::Nothing; func.var_count];
		vars[..args.len()].clone_from_slice(args);
		let mut stack: Vec<RtValue> = Vec::with_capacity(16);
		let mut pc = 0usize;

		macro_rules! pop {
			() => {
				stack.pop().ok_or_else(|| error!(internal::internal("bytecode stack underflow")))?
			};
		}

		loop {
			let byte = read_u8(code, &mut pc)?;
			let opcode = Opcode::from_u8(byte)
				.ok_or_else(|| error!(internal::internal(format!("invalid opcode {byte:#04x}"))))?;
			match opcode {
				Opcode::Return => return Ok(()),
				Opcode::Pop => {
					pop!();
				}
				Opcode::PushConst => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = self
						.program
						.constants
						.get(idx)
						.ok_or_else(|| error!(internal::internal("constant index out of range")))?;
					stack.push(RtValue::Value(value.clone()));
				}
				Opcode::LoadVar => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = vars
						.get(idx)
						.cloned()
						.ok_or_else(|| error!(internal::internal("variable slot out of range")))?;
					stack.push(value);
				}
				Opcode::StoreVar => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = pop!();
					match vars.get_mut(idx) {
						Some(slot) => *slot = value,
						None => return Err(error!(internal::internal("variable slot out of range"))),
					}
				}
				Opcode::LoadQState => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = ctx
						.query_state
						.read()
						.get(idx)
						.cloned()
						.ok_or_else(|| error!(internal::internal("query slot out of range")))?;
					stack.push(value);
				}
				Opcode::StoreQState => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = pop!();
					match ctx.query_state.write().get_mut(idx) {
						Some(slot) => *slot = value,
						None => return Err(error!(internal::internal("query slot out of range"))),
					}
				}
				Opcode::LoadPState => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = ctx
						.pipeline_state
						.get(idx)
						.cloned()
						.ok_or_else(|| error!(internal::internal("pipeline slot out of range")))?;
					stack.push(value);
				}
				Opcode::StorePState => {
					let idx = read_u16(code, &mut pc)? as usize;
					let value = pop!();
					match ctx.pipeline_state.get_mut(idx) {
						Some(slot) => *slot = value,
						None => return Err(error!(internal::internal("pipeline slot out of range"))),
					}
				}
				Opcode::Binary => {
					let op = *BINARY_OPS
						.get(read_u8(code, &mut pc)? as usize)
						.ok_or_else(|| error!(internal::internal("invalid binary operator code")))?;
					let rhs = pop!();
					let lhs = pop!();
					stack.push(RtValue::Value(runtime::ops::binary(op, lhs.value()?, rhs.value()?)?));
				}
				Opcode::Unary => {
					let op = *UNARY_OPS
						.get(read_u8(code, &mut pc)? as usize)
						.ok_or_else(|| error!(internal::internal("invalid unary operator code")))?;
					let operand = pop!();
					stack.push(RtValue::Value(runtime::ops::unary(op, operand.value()?)?));
				}
				Opcode::Call => {
					let builtin = *BUILTINS
						.get(read_u8(code, &mut pc)? as usize)
						.ok_or_else(|| error!(internal::internal("invalid builtin code")))?;
					let argc = read_u8(code, &mut pc)? as usize;
					if stack.len() < argc {
						return Err(error!(internal::internal("bytecode stack underflow")));
					}
					let args = stack.split_off(stack.len() - argc);
					stack.push(runtime::dispatch(builtin, args, ctx)?);
				}
				Opcode::Jump => {
					pc = read_u32(code, &mut pc)? as usize;
				}
				Opcode::JumpIfFalse => {
					let target = read_u32(code, &mut pc)? as usize;
					if !pop!().is_truthy() {
						pc = target;
					}
				}
			}
		}
	}
}
