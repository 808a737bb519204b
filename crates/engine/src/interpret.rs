// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Tree-walking backend.
//!
//! Executes the structured IR directly, with no lowering step. This is
//! the backend a query starts on in interleaved mode: translation
//! finishes and rows start flowing while the bytecode backend is still
//! being produced.

use smelt_type::{Result, diagnostic::internal, error};

use crate::{
	exec::Backend,
	ir::{Expr, FuncId, Module, StateRef, Stmt},
	runtime::{self, RtValue, RuntimeCtx},
};

/// How a statement sequence ended.
enum Flow {
	Normal,
	Break,
	Return,
}

pub struct Interpreter {
	module: std::sync::Arc<Module>,
}

impl Interpreter {
	pub fn new(module: std::sync::Arc<Module>) -> Self {
		Self {
			module,
		}
	}

	fn eval(&self, expr: &Expr, vars: &[RtValue], ctx: &mut RuntimeCtx<'_>) -> Result<RtValue> {
		match expr {
			Expr::Const(v) => Ok(RtValue::Value(v.clone())),
			Expr::Var(var) => vars
				.get(var.0)
				.cloned()
				.ok_or_else(|| error!(internal::internal(format!("variable v{} out of range", var.0)))),
			Expr::State(StateRef::Query(slot)) => self.state_slot(ctx.query_state.read().as_slice(), slot.0),
			Expr::State(StateRef::Pipeline(slot)) => self.state_slot(ctx.pipeline_state.as_slice(), slot.0),
			Expr::Binary {
				op,
				left,
				right,
			} => {
				let lhs = self.eval(left, vars, ctx)?;
				let rhs = self.eval(right, vars, ctx)?;
				Ok(RtValue::Value(runtime::ops::binary(*op, lhs.value()?, rhs.value()?)?))
			}
			Expr::Unary {
				op,
				operand,
			} => {
				let v = self.eval(operand, vars, ctx)?;
				Ok(RtValue::Value(runtime::ops::unary(*op, v.value()?)?))
			}
			Expr::Call {
				builtin,
				args,
			} => {
				let mut evaluated = Vec::with_capacity(args.len());
				for arg in args {
					evaluated.push(self.eval(arg, vars, ctx)?);
				}
				runtime::dispatch(*builtin, evaluated, ctx)
			}
		}
	}

	fn state_slot(&self, slots: &[RtValue], index: usize) -> Result<RtValue> {
		slots.get(index)
			.cloned()
			.ok_or_else(|| error!(internal::internal(format!("state slot {index} out of range"))))
	}

	fn exec_block(&self, block: &[Stmt], vars: &mut Vec<RtValue>, ctx: &mut RuntimeCtx<'_>) -> Result<Flow> {
		for stmt in block {
			match stmt {
				Stmt::Assign {
					var,
					expr,
				} => {
					let value = self.eval(expr, vars, ctx)?;
					match vars.get_mut(var.0) {
						Some(slot) => *slot = value,
						None => {
							return Err(error!(internal::internal(format!(
								"variable v{} out of range",
								var.0
							))));
						}
					}
				}
				Stmt::SetState {
					target,
					expr,
				} => {
					let value = self.eval(expr, vars, ctx)?;
					match target {
						StateRef::Query(slot) => {
							let mut state = ctx.query_state.write();
							match state.get_mut(slot.0) {
								Some(entry) => *entry = value,
								None => {
									return Err(error!(internal::internal(format!(
										"query slot {} out of range",
										slot.0
									))));
								}
							}
						}
						StateRef::Pipeline(slot) => match ctx.pipeline_state.get_mut(slot.0) {
							Some(entry) => *entry = value,
							None => {
								return Err(error!(internal::internal(format!(
									"pipeline slot {} out of range",
									slot.0
								))));
							}
						},
					}
				}
				Stmt::Eval(expr) => {
					self.eval(expr, vars, ctx)?;
				}
				Stmt::If {
					cond,
					then_block,
					else_block,
				} => {
					let branch = if self.eval(cond, vars, ctx)?.is_truthy() {
						then_block
					} else {
						else_block
					};
					match self.exec_block(branch, vars, ctx)? {
						Flow::Normal => {}
						flow => return Ok(flow),
					}
				}
				Stmt::Loop(body) => loop {
					match self.exec_block(body, vars, ctx)? {
						Flow::Normal => {}
						Flow::Break => break,
						Flow::Return => return Ok(Flow::Return),
					}
				},
				Stmt::Break => return Ok(Flow::Break),
				Stmt::Return => return Ok(Flow::Return),
			}
		}
		Ok(Flow::Normal)
	}
}

impl Backend for Interpreter {
	fn name(&self) -> &'static str {
		"interpreted"
	}

	fn run(&self, func: FuncId, args: &[RtValue], ctx: &mut RuntimeCtx<'_>) -> Result<()> {
		let func = self.module.func(func);
		if args.len() != func.params {
			return Err(error!(internal::internal(format!(
				"function {} expects {} arguments, got {}",
				func.name,
				func.params,
				args.len()
			))));
		}
		let mut vars = vec![RtValue::Nothing; func.vars.len()];
		vars[..args.len()].clone_from_slice(args);
		self.exec_block(&func.body, &mut vars, ctx)?;
		Ok(())
	}
}
