// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	ir::{Expr, FuncBuilder, StateRef},
	pipeline::{PipelineId, PipelineSlot, SlotType},
	plan::{BinaryOp, TakeNode},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext},
};

/// Offset/limit. Counting rows makes the operator order-sensitive, so
/// its pipeline always runs serial. A limit of zero emits nothing; the
/// source loop still drains, which is fine for the row volumes a take
/// sits on top of.
#[derive(Clone, Debug)]
pub struct TakeTranslator {
	offset: u64,
	limit: Option<u64>,
	skipped_slot: PipelineSlot,
	taken_slot: PipelineSlot,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &TakeNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Take", pipeline);
	let p = &mut ctx.pipelines[pipeline.0];
	p.force_serial();
	let skipped_slot = p.declare_slot("take_skipped", SlotType::Scalar(Type::Int8), id);
	let taken_slot = p.declare_slot("take_taken", SlotType::Scalar(Type::Int8), id);
	ctx.install(
		id,
		Translator::Take(TakeTranslator {
			offset: node.offset,
			limit: node.limit,
			skipped_slot,
			taken_slot,
		}),
	);
	ctx.prepare(&node.input, pipeline)?;
	Ok(id)
}

impl TakeTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(StateRef::Pipeline(self.skipped_slot), Expr::int8(0));
		b.set_state(StateRef::Pipeline(self.taken_slot), Expr::int8(0));
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let skipped = StateRef::Pipeline(self.skipped_slot);
		let taken = StateRef::Pipeline(self.taken_slot);

		let pass = |wc: &mut WorkContext<'_>, b: &mut FuncBuilder| -> Result<()> {
			match self.limit {
				Some(limit) => b.if_then(
					Expr::binary(BinaryOp::LessThan, Expr::State(taken), Expr::int8(limit as i64)),
					|b| {
						b.set_state(taken, Expr::binary(BinaryOp::Add, Expr::State(taken), Expr::int8(1)));
						wc.consume(ctx, b)
					},
				),
				None => wc.consume(ctx, b),
			}
		};

		if self.offset == 0 {
			return pass(wc, b);
		}
		b.if_then_else(
			Expr::binary(BinaryOp::LessThan, Expr::State(skipped), Expr::int8(self.offset as i64)),
			|b| {
				b.set_state(skipped, Expr::binary(BinaryOp::Add, Expr::State(skipped), Expr::int8(1)));
				Ok(())
			},
			|b| pass(wc, b),
		)
	}
}
