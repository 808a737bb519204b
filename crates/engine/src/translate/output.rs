// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	feature::OperatingUnitKind,
	ir::{Expr, FuncBuilder, StateRef},
	pipeline::{PipelineId, PipelineSlot, SlotType},
	plan::{BinaryOp, PhysicalPlan},
	runtime::Builtin,
	translate::{CompilationContext, Translator, TranslatorId, WorkContext},
};

/// Root consumer of a query plan: hands each finished row to the result
/// sink. Emission order is part of the result, so the root pipeline is
/// always serial.
#[derive(Clone, Debug)]
pub struct OutputTranslator {
	id: TranslatorId,
	rows_slot: PipelineSlot,
	record: bool,
}

pub fn prepare_output(ctx: &mut CompilationContext<'_>, plan: &PhysicalPlan, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Output", pipeline);
	let types = ctx.child_types(plan)?;
	let p = &mut ctx.pipelines[pipeline.0];
	p.force_serial();
	let rows_slot = p.declare_slot("out_rows", SlotType::Scalar(Type::Int8), id);
	let features: Vec<_> = types.iter().map(|ty| (*ty, OperatingUnitKind::OutputEmit)).collect();
	ctx.add_features(id, pipeline, &features);
	ctx.install(
		id,
		Translator::Output(OutputTranslator {
			id,
			rows_slot,
			record: ctx.record_features(),
		}),
	);
	ctx.prepare(plan, pipeline)?;
	Ok(id)
}

impl OutputTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(StateRef::Pipeline(self.rows_slot), Expr::int8(0));
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		_ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		b.eval(Expr::call(Builtin::ResultEmit, wc.outputs.clone()));
		if self.record {
			let slot = StateRef::Pipeline(self.rows_slot);
			b.set_state(slot, Expr::binary(BinaryOp::Add, Expr::State(slot), Expr::int8(1)));
		}
		Ok(())
	}

	pub fn merge_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if !self.record {
			return Ok(());
		}
		b.eval(Expr::call(
			Builtin::FeatureRecord,
			vec![Expr::int8(self.id.0 as i64), Expr::int8(0), Expr::State(StateRef::Pipeline(self.rows_slot))],
		));
		Ok(())
	}
}
