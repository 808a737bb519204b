// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Human-readable IR dumps for `EXPLAIN` output and debugging.

use std::fmt::{self, Display, Formatter};

use crate::ir::{Expr, Func, Module, StateRef, Stmt};

impl Display for Expr {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Expr::Const(v) => write!(f, "{v}"),
			Expr::Var(var) => write!(f, "v{}", var.0),
			Expr::State(StateRef::Query(slot)) => write!(f, "qstate[{}]", slot.0),
			Expr::State(StateRef::Pipeline(slot)) => write!(f, "pstate[{}]", slot.0),
			Expr::Binary {
				op,
				left,
				right,
			} => write!(f, "({left} {op} {right})"),
			Expr::Unary {
				op,
				operand,
			} => write!(f, "({op} {operand})"),
			Expr::Call {
				builtin,
				args,
			} => {
				write!(f, "@{builtin}(")?;
				for (i, arg) in args.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{arg}")?;
				}
				f.write_str(")")
			}
		}
	}
}

fn fmt_block(f: &mut Formatter<'_>, block: &[Stmt], depth: usize) -> fmt::Result {
	for stmt in block {
		fmt_stmt(f, stmt, depth)?;
	}
	Ok(())
}

fn fmt_stmt(f: &mut Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
	let pad = "  ".repeat(depth);
	match stmt {
		Stmt::Assign {
			var,
			expr,
		} => writeln!(f, "{pad}v{} = {expr}", var.0),
		Stmt::SetState {
			target: StateRef::Query(slot),
			expr,
		} => writeln!(f, "{pad}qstate[{}] = {expr}", slot.0),
		Stmt::SetState {
			target: StateRef::Pipeline(slot),
			expr,
		} => writeln!(f, "{pad}pstate[{}] = {expr}", slot.0),
		Stmt::Eval(expr) => writeln!(f, "{pad}{expr}"),
		Stmt::If {
			cond,
			then_block,
			else_block,
		} => {
			writeln!(f, "{pad}if {cond} {{")?;
			fmt_block(f, then_block, depth + 1)?;
			if !else_block.is_empty() {
				writeln!(f, "{pad}}} else {{")?;
				fmt_block(f, else_block, depth + 1)?;
			}
			writeln!(f, "{pad}}}")
		}
		Stmt::Loop(body) => {
			writeln!(f, "{pad}loop {{")?;
			fmt_block(f, body, depth + 1)?;
			writeln!(f, "{pad}}}")
		}
		Stmt::Break => writeln!(f, "{pad}break"),
		Stmt::Return => writeln!(f, "{pad}return"),
	}
}

impl Display for Func {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "fn {}(", self.name)?;
		for (i, var) in self.vars.iter().take(self.params).enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			write!(f, "v{i}: {}", var.name)?;
		}
		writeln!(f, ") {{")?;
		fmt_block(f, &self.body, 1)?;
		writeln!(f, "}}")
	}
}

impl Display for Module {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		for (i, func) in self.funcs.iter().enumerate() {
			if i > 0 {
				writeln!(f)?;
			}
			write!(f, "{func}")?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use smelt_type::{Type, Value};

	use super::*;
	use crate::{ir::FuncBuilder, pipeline::SlotType, plan::BinaryOp};

	#[test]
	fn test_func_dump_shape() {
		let mut b = FuncBuilder::new("p0_work");
		let v = b.param("row", SlotType::Scalar(Type::Int8));
		b.loop_(|b| {
			b.if_then(Expr::binary(BinaryOp::LessThan, Expr::Var(v), Expr::Const(Value::int8(3))), |b| {
				b.break_();
				Ok(())
			})
		})
		.unwrap();
		b.return_();

		let text = b.finish().to_string();
		assert!(text.starts_with("fn p0_work(v0: row) {"));
		assert!(text.contains("if (v0 < 3) {"));
		assert!(text.contains("break"));
		assert!(text.ends_with("}\n"));
	}
}
