// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! The intermediate representation produced by the translators.
//!
//! The IR is deliberately small: scalar expressions over local
//! variables and state slots, structured control flow (`if`, an
//! infinite `loop` exited by `break`) and calls into the runtime
//! builtin library. Everything an operator does that touches storage or
//! a runtime object goes through a builtin, which is what keeps the
//! tree interpreter and the bytecode backend semantically identical.

mod builder;
mod display;

pub use builder::FuncBuilder;

use smelt_type::Value;

use crate::{
	pipeline::{PipelineSlot, QuerySlot, SlotType},
	plan::{BinaryOp, UnaryOp},
	runtime::{Builtin, ObjectSpec},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncId(pub usize);

/// A readable or writable state location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateRef {
	/// Query-wide slot, shared by all pipelines. Written only during
	/// serial phases.
	Query(QuerySlot),
	/// Slot in the executing worker's pipeline-state arena.
	Pipeline(PipelineSlot),
}

#[derive(Clone, Debug)]
pub enum Expr {
	Const(Value),
	Var(VarId),
	State(StateRef),
	Binary {
		op: BinaryOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	Unary {
		op: UnaryOp,
		operand: Box<Expr>,
	},
	Call {
		builtin: Builtin,
		args: Vec<Expr>,
	},
}

impl Expr {
	pub fn call(builtin: Builtin, args: Vec<Expr>) -> Expr {
		Expr::Call {
			builtin,
			args,
		}
	}

	pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
		Expr::Binary {
			op,
			left: Box::new(left),
			right: Box::new(right),
		}
	}

	pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
		Expr::Unary {
			op,
			operand: Box::new(operand),
		}
	}

	pub fn int8(v: i64) -> Expr {
		Expr::Const(Value::int8(v))
	}
}

#[derive(Clone, Debug)]
pub enum Stmt {
	Assign {
		var: VarId,
		expr: Expr,
	},
	SetState {
		target: StateRef,
		expr: Expr,
	},
	/// Evaluate for effect, discarding the result.
	Eval(Expr),
	If {
		cond: Expr,
		then_block: Vec<Stmt>,
		else_block: Vec<Stmt>,
	},
	Loop(Vec<Stmt>),
	Break,
	Return,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
	pub name: String,
	pub ty: SlotType,
}

/// One generated function. The first `params` variables are bound to
/// the arguments on entry; the rest start as `Undefined`.
#[derive(Clone, Debug)]
pub struct Func {
	pub name: String,
	pub params: usize,
	pub vars: Vec<VarDecl>,
	pub body: Vec<Stmt>,
}

/// Everything the backends need to run a query: the generated functions
/// plus the runtime object specs they instantiate. Catalog resolution
/// happens at translation time, so a module is self-contained.
#[derive(Clone, Debug, Default)]
pub struct Module {
	pub funcs: Vec<Func>,
	pub objects: Vec<ObjectSpec>,
}

impl Module {
	pub fn add_func(&mut self, func: Func) -> FuncId {
		self.funcs.push(func);
		FuncId(self.funcs.len() - 1)
	}

	pub fn func(&self, id: FuncId) -> &Func {
		&self.funcs[id.0]
	}

	pub fn add_object(&mut self, spec: ObjectSpec) -> usize {
		self.objects.push(spec);
		self.objects.len() - 1
	}
}
