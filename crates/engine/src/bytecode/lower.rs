// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::collections::HashMap;

use smelt_type::{Result, Value, diagnostic::compile, error};
use tracing::debug;

use crate::{
	bytecode::{
		CompiledFunc, CompiledProgram, Opcode,
		opcode::{binary_code, builtin_code, unary_code},
	},
	ir::{Expr, Func, Module, StateRef, Stmt},
};

/// Lower a translated module to bytecode. Pure function of the module;
/// safe to run on a background thread while the interpreter is already
/// executing the same module.
pub fn lower(module: &Module) -> Result<CompiledProgram> {
	let mut constants = ConstantPool::default();
	let mut funcs = Vec::with_capacity(module.funcs.len());
	for func in &module.funcs {
		funcs.push(lower_func(func, &mut constants)?);
	}
	let program = CompiledProgram {
		constants: constants.values,
		funcs,
	};
	debug!(funcs = program.funcs.len(), code_bytes = program.code_size(), "module lowered to bytecode");
	Ok(program)
}

#[derive(Default)]
struct ConstantPool {
	values: Vec<Value>,
	index: HashMap<Value, u16>,
}

impl ConstantPool {
	fn intern(&mut self, value: &Value) -> Result<u16> {
		if let Some(idx) = self.index.get(value) {
			return Ok(*idx);
		}
		let idx = u16::try_from(self.values.len())
			.map_err(|_| error!(compile::codegen_failed("constant pool exceeds 65536 entries")))?;
		self.values.push(value.clone());
		self.index.insert(value.clone(), idx);
		Ok(idx)
	}
}

fn lower_func(func: &Func, constants: &mut ConstantPool) -> Result<CompiledFunc> {
	if func.vars.len() > u16::MAX as usize {
		return Err(error!(compile::codegen_failed(format!("function {} has too many variables", func.name))));
	}
	let mut lowerer = Lowerer {
		code: Vec::new(),
		constants,
		loops: Vec::new(),
		func_name: &func.name,
	};
	lowerer.block(&func.body)?;
	lowerer.op(Opcode::Return);
	Ok(CompiledFunc {
		name: func.name.clone(),
		params: func.params,
		var_count: func.vars.len(),
		code: lowerer.code,
	})
}

struct Lowerer<'a> {
	code: Vec<u8>,
	constants: &'a mut ConstantPool,
	/// Break patch sites per enclosing loop.
	loops: Vec<Vec<usize>>,
	func_name: &'a str,
}

impl Lowerer<'_> {
	fn block(&mut self, stmts: &[Stmt]) -> Result<()> {
		for stmt in stmts {
			self.stmt(stmt)?;
		}
		Ok(())
	}

	fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
		match stmt {
			Stmt::Assign {
				var,
				expr,
			} => {
				self.expr(expr)?;
				self.op(Opcode::StoreVar);
				self.u16(var.0 as u16);
			}
			Stmt::SetState {
				target,
				expr,
			} => {
				self.expr(expr)?;
				match target {
					StateRef::Query(slot) => {
						self.op(Opcode::StoreQState);
						self.u16(slot.0 as u16);
					}
					StateRef::Pipeline(slot) => {
						self.op(Opcode::StorePState);
						self.u16(slot.0 as u16);
					}
				}
			}
			Stmt::Eval(expr) => {
				self.expr(expr)?;
				self.op(Opcode::Pop);
			}
			Stmt::If {
				cond,
				then_block,
				else_block,
			} => {
				self.expr(cond)?;
				self.op(Opcode::JumpIfFalse);
				let to_else = self.placeholder();
				self.block(then_block)?;
				if else_block.is_empty() {
					self.patch(to_else);
				} else {
					self.op(Opcode::Jump);
					let to_end = self.placeholder();
					self.patch(to_else);
					self.block(else_block)?;
					self.patch(to_end);
				}
			}
			Stmt::Loop(body) => {
				let start = self.code.len() as u32;
				self.loops.push(Vec::new());
				self.block(body)?;
				self.op(Opcode::Jump);
				let at = self.placeholder();
				self.code[at..at + 4].copy_from_slice(&start.to_le_bytes());
				let breaks = self.loops.pop().unwrap_or_default();
				for site in breaks {
					self.patch(site);
				}
			}
			Stmt::Break => {
				self.op(Opcode::Jump);
				let at = self.placeholder();
				match self.loops.last_mut() {
					Some(frame) => frame.push(at),
					None => {
						return Err(error!(compile::codegen_failed(format!(
							"break outside loop in {}",
							self.func_name
						))));
					}
				}
			}
			Stmt::Return => self.op(Opcode::Return),
		}
		Ok(())
	}

	fn expr(&mut self, expr: &Expr) -> Result<()> {
		match expr {
			Expr::Const(value) => {
				let idx = self.constants.intern(value)?;
				self.op(Opcode::PushConst);
				self.u16(idx);
			}
			Expr::Var(var) => {
				self.op(Opcode::LoadVar);
				self.u16(var.0 as u16);
			}
			Expr::State(StateRef::Query(slot)) => {
				self.op(Opcode::LoadQState);
				self.u16(slot.0 as u16);
			}
			Expr::State(StateRef::Pipeline(slot)) => {
				self.op(Opcode::LoadPState);
				self.u16(slot.0 as u16);
			}
			Expr::Binary {
				op,
				left,
				right,
			} => {
				self.expr(left)?;
				self.expr(right)?;
				self.op(Opcode::Binary);
				self.code.push(binary_code(*op));
			}
			Expr::Unary {
				op,
				operand,
			} => {
				self.expr(operand)?;
				self.op(Opcode::Unary);
				self.code.push(unary_code(*op));
			}
			Expr::Call {
				builtin,
				args,
			} => {
				if args.len() > u8::MAX as usize {
					return Err(error!(compile::codegen_failed("builtin call with more than 255 arguments")));
				}
				for arg in args {
					self.expr(arg)?;
				}
				self.op(Opcode::Call);
				self.code.push(builtin_code(*builtin));
				self.code.push(args.len() as u8);
			}
		}
		Ok(())
	}

	fn op(&mut self, opcode: Opcode) {
		self.code.push(opcode as u8);
	}

	fn u16(&mut self, value: u16) {
		self.code.extend_from_slice(&value.to_le_bytes());
	}

	/// Reserve a `u32` jump target, returning its offset for patching.
	fn placeholder(&mut self) -> usize {
		let at = self.code.len();
		self.code.extend_from_slice(&u32::MAX.to_le_bytes());
		at
	}

	/// Point the placeholder at the current end of code.
	fn patch(&mut self, at: usize) {
		let target = self.code.len() as u32;
		self.code[at..at + 4].copy_from_slice(&target.to_le_bytes());
	}
}

#[cfg(test)]
mod tests {
	use smelt_type::Type;

	use super::*;
	use crate::{ir::FuncBuilder, pipeline::SlotType, plan::BinaryOp};

	#[test]
	fn test_loop_breaks_patch_past_backedge() {
		let mut b = FuncBuilder::new("f");
		let v = b.declare("v", SlotType::Scalar(Type::Int8));
		b.assign(v, Expr::int8(0));
		b.loop_(|b| {
			b.if_then(Expr::binary(BinaryOp::GreaterThanEqual, Expr::Var(v), Expr::int8(3)), |b| {
				b.break_();
				Ok(())
			})?;
			b.assign(v, Expr::binary(BinaryOp::Add, Expr::Var(v), Expr::int8(1)));
			Ok(())
		})
		.unwrap();
		b.return_();

		let module = {
			let mut m = Module::default();
			m.add_func(b.finish());
			m
		};
		let program = lower(&module).unwrap();
		let code = &program.funcs[0].code;

		// no placeholder may survive lowering
		assert!(!code.windows(4).any(|w| w == u32::MAX.to_le_bytes()));
		// constants deduplicate: 0, 3, 1
		assert_eq!(program.constants.len(), 3);
	}

	#[test]
	fn test_break_outside_loop_is_codegen_error() {
		let mut b = FuncBuilder::new("f");
		b.break_();
		let module = {
			let mut m = Module::default();
			m.add_func(b.finish());
			m
		};
		assert_eq!(lower(&module).unwrap_err().code(), "COMPILE_003");
	}
}
