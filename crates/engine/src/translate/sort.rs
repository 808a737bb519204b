// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	feature::OperatingUnitKind,
	ir::{Expr, FuncBuilder, StateRef},
	pipeline::{PipelineId, PipelineSlot, QuerySlot, SlotType},
	plan::{SortNode, UnaryOp},
	runtime::{Builtin, ObjectSpec, SorterSpec},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext},
};

/// Sort, as a pipeline breaker: the build side collects rows into
/// worker-local sorters, the merges concatenate them into the
/// query-wide sorter and the build pipeline's teardown performs the
/// one sort over the complete input. The output side then streams rows
/// in order.
#[derive(Clone, Debug)]
pub struct SortTranslator {
	id: TranslatorId,
	spec: usize,
	input_types: Vec<Type>,
	global_slot: QuerySlot,
	local_slot: PipelineSlot,
	build_pipeline: PipelineId,
	record: bool,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &SortNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Sort", pipeline);
	ctx.pipelines[pipeline.0].force_serial();

	let input_types = ctx.child_types(&node.input)?;
	let mut features = Vec::with_capacity(node.keys.len() + 1);
	for key in &node.keys {
		features.push((input_types.get(key.column).copied().unwrap_or(Type::Undefined), OperatingUnitKind::SortBuild));
	}
	features.push((input_types.first().copied().unwrap_or(Type::Undefined), OperatingUnitKind::SortIterate));
	ctx.add_features(id, pipeline, &features);

	let spec = ctx.module.add_object(ObjectSpec::Sorter(SorterSpec {
		keys: node.keys.iter().map(|k| (k.column, k.direction)).collect(),
		width: input_types.len(),
	}));
	let global_slot = ctx.declare_query_slot("sort_global", SlotType::Handle, id);

	let build_pipeline = ctx.new_pipeline();
	ctx.pipelines[pipeline.0].depends_on.push(build_pipeline);
	ctx.also_register(id, build_pipeline);
	let local_slot = ctx.pipelines[build_pipeline.0].declare_slot("sort_local", SlotType::Handle, id);

	ctx.install(
		id,
		Translator::Sort(SortTranslator {
			id,
			spec,
			input_types,
			global_slot,
			local_slot,
			build_pipeline,
			record: ctx.record_features(),
		}),
	);
	ctx.prepare(&node.input, build_pipeline)?;
	Ok(id)
}

impl SortTranslator {
	pub fn initialize_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(
			StateRef::Query(self.global_slot),
			Expr::call(Builtin::SorterInit, vec![Expr::int8(self.spec as i64)]),
		);
		Ok(())
	}

	pub fn teardown_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::State(StateRef::Query(self.global_slot))]));
		Ok(())
	}

	pub fn initialize_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if pipeline == self.build_pipeline {
			b.set_state(
				StateRef::Pipeline(self.local_slot),
				Expr::call(Builtin::SorterInit, vec![Expr::int8(self.spec as i64)]),
			);
		}
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		if wc.pipeline.id == self.build_pipeline {
			let mut args = Vec::with_capacity(1 + wc.outputs.len());
			args.push(Expr::State(StateRef::Pipeline(self.local_slot)));
			args.extend(wc.outputs.iter().cloned());
			b.eval(Expr::call(Builtin::SorterInsert, args));
			return Ok(());
		}

		let iter = b.let_(
			"sort_iter",
			SlotType::Handle,
			Expr::call(Builtin::SorterIterInit, vec![Expr::State(StateRef::Query(self.global_slot))]),
		);
		b.loop_(|b| {
			b.if_then(
				Expr::unary(UnaryOp::Not, Expr::call(Builtin::RowIterAdvance, vec![Expr::Var(iter)])),
				|b| {
					b.break_();
					Ok(())
				},
			)?;
			let mut outputs = Vec::with_capacity(self.input_types.len());
			for (i, ty) in self.input_types.iter().enumerate() {
				let var = b.let_(
					format!("sorted{i}"),
					SlotType::Scalar(*ty),
					Expr::call(Builtin::RowIterColumn, vec![Expr::Var(iter), Expr::int8(i as i64)]),
				);
				outputs.push(Expr::Var(var));
			}
			wc.outputs = outputs;
			wc.slot = None;
			wc.consume(ctx, b)
		})?;
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(iter)]));
		Ok(())
	}

	pub fn merge_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if pipeline == self.build_pipeline {
			b.eval(Expr::call(
				Builtin::SorterMerge,
				vec![Expr::State(StateRef::Query(self.global_slot)), Expr::State(StateRef::Pipeline(self.local_slot))],
			));
		}
		Ok(())
	}

	pub fn teardown_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if pipeline != self.build_pipeline {
			return Ok(());
		}
		// all worker sorters merged by now; one sort over the whole input
		b.eval(Expr::call(Builtin::SorterSort, vec![Expr::State(StateRef::Query(self.global_slot))]));
		if self.record {
			b.eval(Expr::call(
				Builtin::FeatureRecord,
				vec![
					Expr::int8(self.id.0 as i64),
					Expr::int8(1),
					Expr::call(Builtin::ObjectCount, vec![Expr::State(StateRef::Query(self.global_slot))]),
				],
			));
		}
		Ok(())
	}
}
