// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	feature::{OperatingUnitKind, aggregate_features, expression_features},
	ir::{Expr, FuncBuilder, StateRef},
	pipeline::{PipelineId, PipelineSlot, QuerySlot, SlotType},
	plan::{AggregateExpr, AggregateNode, Expression, UnaryOp},
	runtime::{AggSpec, Builtin, ObjectSpec},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext, translate_expression},
};

/// Hash aggregation. A pipeline breaker: the build side consumes its
/// child in a dedicated pipeline, updating a worker-local table that is
/// merged into the query-wide table; the output side sources the parent
/// pipeline by iterating the merged groups.
#[derive(Clone, Debug)]
pub struct AggregateTranslator {
	id: TranslatorId,
	spec: usize,
	group_by: Vec<Expression>,
	aggregates: Vec<AggregateExpr>,
	output_types: Vec<Type>,
	global_slot: QuerySlot,
	local_slot: PipelineSlot,
	build_pipeline: PipelineId,
	record: bool,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &AggregateNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Aggregate", pipeline);
	ctx.pipelines[pipeline.0].force_serial();

	let input = ctx.child_types(&node.input)?;
	let mut output_types = Vec::with_capacity(node.group_by.len() + node.aggregates.len());
	let mut features = Vec::new();
	for key in &node.group_by {
		output_types.push(key.result_type(&input)?);
		expression_features(key, &input, &mut features);
	}
	for agg in &node.aggregates {
		output_types.push(agg.result_type(&input)?);
		aggregate_features(agg.func, agg.arg_type(&input)?, &mut features);
		if let Some(arg) = &agg.arg {
			expression_features(arg, &input, &mut features);
		}
	}
	features.push((output_types.first().copied().unwrap_or(Type::Int8), OperatingUnitKind::AggregateIterate));
	ctx.add_features(id, pipeline, &features);

	let spec = ctx.module.add_object(ObjectSpec::Agg(AggSpec {
		key_count: node.group_by.len(),
		aggs: node.aggregates.iter().map(|a| a.func).collect(),
	}));
	let global_slot = ctx.declare_query_slot("agg_global", SlotType::Handle, id);

	let build_pipeline = ctx.new_pipeline();
	ctx.pipelines[pipeline.0].depends_on.push(build_pipeline);
	ctx.also_register(id, build_pipeline);
	let local_slot = ctx.pipelines[build_pipeline.0].declare_slot("agg_local", SlotType::Handle, id);

	ctx.install(
		id,
		Translator::Aggregate(AggregateTranslator {
			id,
			spec,
			group_by: node.group_by.clone(),
			aggregates: node.aggregates.clone(),
			output_types,
			global_slot,
			local_slot,
			build_pipeline,
			record: ctx.record_features(),
		}),
	);
	ctx.prepare(&node.input, build_pipeline)?;
	Ok(id)
}

impl AggregateTranslator {
	pub fn initialize_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(
			StateRef::Query(self.global_slot),
			Expr::call(Builtin::AggInit, vec![Expr::int8(self.spec as i64)]),
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
				Expr::call(Builtin::AggInit, vec![Expr::int8(self.spec as i64)]),
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
			self.emit_build(wc, b)
		} else {
			self.emit_output(ctx, wc, b)
		}
	}

	/// Consumer role: fold the current row into the worker-local table.
	fn emit_build(&self, wc: &mut WorkContext<'_>, b: &mut FuncBuilder) -> Result<()> {
		let mut args = Vec::with_capacity(1 + self.group_by.len() + self.aggregates.len());
		args.push(Expr::State(StateRef::Pipeline(self.local_slot)));
		for key in &self.group_by {
			args.push(translate_expression(key, &wc.outputs)?);
		}
		for agg in &self.aggregates {
			// count(*) folds the row itself, the argument is unused
			args.push(match &agg.arg {
				Some(arg) => translate_expression(arg, &wc.outputs)?,
				None => Expr::int8(0),
			});
		}
		b.eval(Expr::call(Builtin::AggUpdate, args));
		Ok(())
	}

	/// Source role: iterate the merged groups into the parent pipeline.
	fn emit_output(&self, ctx: &CompilationContext<'_>, wc: &mut WorkContext<'_>, b: &mut FuncBuilder) -> Result<()> {
		let iter = b.let_(
			"agg_iter",
			SlotType::Handle,
			Expr::call(Builtin::AggIterInit, vec![Expr::State(StateRef::Query(self.global_slot))]),
		);
		b.loop_(|b| {
			b.if_then(
				Expr::unary(UnaryOp::Not, Expr::call(Builtin::RowIterAdvance, vec![Expr::Var(iter)])),
				|b| {
					b.break_();
					Ok(())
				},
			)?;
			let mut outputs = Vec::with_capacity(self.output_types.len());
			for (i, ty) in self.output_types.iter().enumerate() {
				let var = b.let_(
					format!("agg{i}"),
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
				Builtin::AggMerge,
				vec![Expr::State(StateRef::Query(self.global_slot)), Expr::State(StateRef::Pipeline(self.local_slot))],
			));
		}
		Ok(())
	}

	pub fn teardown_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if pipeline == self.build_pipeline && self.record {
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
