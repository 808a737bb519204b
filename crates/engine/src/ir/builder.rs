// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::Result;

use crate::{
	ir::{Expr, Func, StateRef, Stmt, VarDecl, VarId},
	pipeline::SlotType,
};

/// Builds one [`Func`] statement by statement. Nested blocks (`if`,
/// `loop`) are built through closures so the block structure in the
/// translator code mirrors the structure of the generated function.
pub struct FuncBuilder {
	name: String,
	params: usize,
	vars: Vec<VarDecl>,
	blocks: Vec<Vec<Stmt>>,
}

impl FuncBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			params: 0,
			vars: Vec::new(),
			blocks: vec![Vec::new()],
		}
	}

	/// Declare a parameter. Must precede all [`FuncBuilder::declare`]
	/// calls so parameters occupy the leading variable ids.
	pub fn param(&mut self, name: impl Into<String>, ty: SlotType) -> VarId {
		debug_assert_eq!(self.params, self.vars.len());
		self.params += 1;
		self.push_var(name, ty)
	}

	pub fn declare(&mut self, name: impl Into<String>, ty: SlotType) -> VarId {
		self.push_var(name, ty)
	}

	fn push_var(&mut self, name: impl Into<String>, ty: SlotType) -> VarId {
		self.vars.push(VarDecl {
			name: name.into(),
			ty,
		});
		VarId(self.vars.len() - 1)
	}

	/// Declare a variable and assign it in one step.
	pub fn let_(&mut self, name: impl Into<String>, ty: SlotType, init: Expr) -> VarId {
		let var = self.push_var(name, ty);
		self.assign(var, init);
		var
	}

	pub fn assign(&mut self, var: VarId, expr: Expr) {
		self.emit(Stmt::Assign {
			var,
			expr,
		});
	}

	pub fn set_state(&mut self, target: StateRef, expr: Expr) {
		self.emit(Stmt::SetState {
			target,
			expr,
		});
	}

	pub fn eval(&mut self, expr: Expr) {
		self.emit(Stmt::Eval(expr));
	}

	pub fn if_then(&mut self, cond: Expr, then: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
		self.blocks.push(Vec::new());
		let out = then(self);
		let then_block = self.blocks.pop().unwrap_or_default();
		out?;
		self.emit(Stmt::If {
			cond,
			then_block,
			else_block: Vec::new(),
		});
		Ok(())
	}

	pub fn if_then_else(
		&mut self,
		cond: Expr,
		then: impl FnOnce(&mut Self) -> Result<()>,
		otherwise: impl FnOnce(&mut Self) -> Result<()>,
	) -> Result<()> {
		self.blocks.push(Vec::new());
		let out = then(self);
		let then_block = self.blocks.pop().unwrap_or_default();
		out?;
		self.blocks.push(Vec::new());
		let out = otherwise(self);
		let else_block = self.blocks.pop().unwrap_or_default();
		out?;
		self.emit(Stmt::If {
			cond,
			then_block,
			else_block,
		});
		Ok(())
	}

	pub fn loop_(&mut self, body: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
		self.blocks.push(Vec::new());
		let out = body(self);
		let block = self.blocks.pop().unwrap_or_default();
		out?;
		self.emit(Stmt::Loop(block));
		Ok(())
	}

	pub fn break_(&mut self) {
		self.emit(Stmt::Break);
	}

	pub fn return_(&mut self) {
		self.emit(Stmt::Return);
	}

	fn emit(&mut self, stmt: Stmt) {
		// blocks is never empty: the root block is created in new()
		if let Some(block) = self.blocks.last_mut() {
			block.push(stmt);
		}
	}

	pub fn finish(mut self) -> Func {
		let body = self.blocks.pop().unwrap_or_default();
		Func {
			name: self.name,
			params: self.params,
			vars: self.vars,
			body,
		}
	}

	/// True when nothing has been emitted into the root block.
	pub fn is_empty(&self) -> bool {
		self.blocks.len() == 1 && self.blocks[0].is_empty()
	}
}

#[cfg(test)]
mod tests {
	use smelt_type::Type;

	use super::*;

	#[test]
	fn test_nested_blocks_land_in_parent() {
		let mut b = FuncBuilder::new("f");
		let v = b.declare("v", SlotType::Scalar(Type::Int8));
		b.loop_(|b| {
			b.if_then(Expr::Var(v), |b| {
				b.break_();
				Ok(())
			})
		})
		.unwrap();
		b.return_();

		let func = b.finish();
		assert_eq!(func.body.len(), 2);
		let Stmt::Loop(body) = &func.body[0] else {
			panic!("expected loop");
		};
		assert!(matches!(body[0], Stmt::If { .. }));
	}

	#[test]
	fn test_params_precede_locals() {
		let mut b = FuncBuilder::new("f");
		let p = b.param("a", SlotType::Scalar(Type::Int8));
		let v = b.declare("b", SlotType::Handle);
		let func = b.finish();
		assert_eq!(p, VarId(0));
		assert_eq!(v, VarId(1));
		assert_eq!(func.params, 1);
	}
}
