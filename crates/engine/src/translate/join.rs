// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type, Value};

use crate::{
	feature::{OperatingUnitKind, expression_features},
	ir::{Expr, FuncBuilder, StateRef, VarId},
	pipeline::{PipelineId, PipelineSlot, QuerySlot, SlotType},
	plan::{Expression, JoinKind, JoinNode, JoinStrategy, UnaryOp},
	runtime::{Builtin, JoinSpec, ObjectSpec},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext, translate_expression},
};

/// Hash and nested-loop joins. The right (build) side materializes into
/// a join table in its own pipeline; the left (probe) side streams
/// through the parent pipeline. A nested-loop join is a join table with
/// no keys: every probe returns every build row and the residual
/// predicate filters the cross product.
#[derive(Clone, Debug)]
pub struct JoinTranslator {
	id: TranslatorId,
	spec: usize,
	kind: JoinKind,
	strategy: JoinStrategy,
	left_keys: Vec<Expression>,
	right_keys: Vec<Expression>,
	residual: Option<Expression>,
	right_types: Vec<Type>,
	global_slot: QuerySlot,
	local_slot: PipelineSlot,
	build_pipeline: PipelineId,
	record: bool,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &JoinNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Join", pipeline);
	let left_types = ctx.child_types(&node.left)?;
	let right_types = ctx.child_types(&node.right)?;

	let mut features = Vec::new();
	if node.strategy == JoinStrategy::Hash {
		for key in &node.left_keys {
			let ty = key.result_type(&left_types).unwrap_or(Type::Undefined);
			features.push((ty, OperatingUnitKind::HashBuild));
			features.push((ty, OperatingUnitKind::HashProbe));
		}
	}
	if let Some(residual) = &node.residual {
		let mut combined = left_types.clone();
		combined.extend(right_types.iter().copied());
		expression_features(residual, &combined, &mut features);
	}
	ctx.add_features(id, pipeline, &features);

	let key_count = match node.strategy {
		JoinStrategy::Hash => node.left_keys.len(),
		JoinStrategy::NestedLoop => 0,
	};
	let spec = ctx.module.add_object(ObjectSpec::Join(JoinSpec {
		key_count,
		payload_count: right_types.len(),
	}));
	let global_slot = ctx.declare_query_slot("join_global", SlotType::Handle, id);

	let build_pipeline = ctx.new_pipeline();
	ctx.pipelines[pipeline.0].depends_on.push(build_pipeline);
	ctx.also_register(id, build_pipeline);
	let local_slot = ctx.pipelines[build_pipeline.0].declare_slot("join_local", SlotType::Handle, id);

	ctx.install(
		id,
		Translator::Join(JoinTranslator {
			id,
			spec,
			kind: node.kind,
			strategy: node.strategy,
			left_keys: node.left_keys.clone(),
			right_keys: node.right_keys.clone(),
			residual: node.residual.clone(),
			right_types,
			global_slot,
			local_slot,
			build_pipeline,
			record: ctx.record_features(),
		}),
	);
	ctx.prepare(&node.right, build_pipeline)?;
	ctx.prepare(&node.left, pipeline)?;
	Ok(id)
}

impl JoinTranslator {
	pub fn initialize_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(
			StateRef::Query(self.global_slot),
			Expr::call(Builtin::JoinInit, vec![Expr::int8(self.spec as i64)]),
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
				Expr::call(Builtin::JoinInit, vec![Expr::int8(self.spec as i64)]),
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
			self.emit_probe(ctx, wc, b)
		}
	}

	/// Build role: insert the right-side row, keyed when hashing.
	fn emit_build(&self, wc: &mut WorkContext<'_>, b: &mut FuncBuilder) -> Result<()> {
		let mut args = Vec::with_capacity(1 + self.right_keys.len() + wc.outputs.len());
		args.push(Expr::State(StateRef::Pipeline(self.local_slot)));
		if self.strategy == JoinStrategy::Hash {
			for key in &self.right_keys {
				args.push(translate_expression(key, &wc.outputs)?);
			}
		}
		args.extend(wc.outputs.iter().cloned());
		b.eval(Expr::call(Builtin::JoinInsert, args));
		Ok(())
	}

	/// Probe role: look up matches for the streaming left row and emit
	/// the joined rows downstream.
	fn emit_probe(&self, ctx: &CompilationContext<'_>, wc: &mut WorkContext<'_>, b: &mut FuncBuilder) -> Result<()> {
		let left_outputs = wc.outputs.clone();

		let mut probe_args = Vec::with_capacity(1 + self.left_keys.len());
		probe_args.push(Expr::State(StateRef::Query(self.global_slot)));
		if self.strategy == JoinStrategy::Hash {
			for key in &self.left_keys {
				probe_args.push(translate_expression(key, &left_outputs)?);
			}
		}
		let iter = b.let_("join_iter", SlotType::Handle, Expr::call(Builtin::JoinProbe, probe_args));

		match self.kind {
			JoinKind::Inner => {
				self.emit_match_loop(ctx, wc, b, iter, &left_outputs, None)?;
			}
			JoinKind::Left => {
				let matched = b.let_("join_matched", SlotType::Scalar(Type::Boolean), Expr::Const(Value::bool(false)));
				self.emit_match_loop(ctx, wc, b, iter, &left_outputs, Some(matched))?;
				// no build row matched: pad the right side with nulls
				b.if_then(Expr::unary(UnaryOp::Not, Expr::Var(matched)), |b| {
					let mut outputs = left_outputs.clone();
					outputs.extend(self.right_types.iter().map(|_| Expr::Const(Value::Undefined)));
					wc.outputs = outputs;
					wc.slot = None;
					wc.consume(ctx, b)
				})?;
			}
			JoinKind::Semi => {
				let matched = self.emit_semi_scan(b, iter, &left_outputs)?;
				b.if_then(Expr::Var(matched), |b| {
					wc.outputs = left_outputs.clone();
					wc.consume(ctx, b)
				})?;
			}
		}
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(iter)]));
		Ok(())
	}

	/// Loop over probe matches, emitting each combined row downstream.
	/// `matched` is set on the first emission when present.
	fn emit_match_loop(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
		iter: VarId,
		left_outputs: &[Expr],
		matched: Option<VarId>,
	) -> Result<()> {
		b.loop_(|b| {
			b.if_then(
				Expr::unary(UnaryOp::Not, Expr::call(Builtin::RowIterAdvance, vec![Expr::Var(iter)])),
				|b| {
					b.break_();
					Ok(())
				},
			)?;
			let combined = self.load_combined(b, iter, left_outputs);
			let emit = |wc: &mut WorkContext<'_>, b: &mut FuncBuilder| -> Result<()> {
				if let Some(matched) = matched {
					b.assign(matched, Expr::Const(Value::bool(true)));
				}
				wc.outputs = combined.clone();
				wc.slot = None;
				wc.consume(ctx, b)
			};
			match &self.residual {
				Some(residual) => {
					let predicate = translate_expression(residual, &combined)?;
					b.if_then(predicate, |b| emit(wc, b))
				}
				None => emit(wc, b),
			}
		})
	}

	/// Semi joins only need existence: scan until one row passes.
	fn emit_semi_scan(&self, b: &mut FuncBuilder, iter: VarId, left_outputs: &[Expr]) -> Result<VarId> {
		let matched = b.let_("join_matched", SlotType::Scalar(Type::Boolean), Expr::Const(Value::bool(false)));
		b.loop_(|b| {
			b.if_then(
				Expr::unary(UnaryOp::Not, Expr::call(Builtin::RowIterAdvance, vec![Expr::Var(iter)])),
				|b| {
					b.break_();
					Ok(())
				},
			)?;
			match &self.residual {
				Some(residual) => {
					let combined = self.load_combined(b, iter, left_outputs);
					let predicate = translate_expression(residual, &combined)?;
					b.if_then(predicate, |b| {
						b.assign(matched, Expr::Const(Value::bool(true)));
						b.break_();
						Ok(())
					})
				}
				None => {
					b.assign(matched, Expr::Const(Value::bool(true)));
					b.break_();
					Ok(())
				}
			}
		})?;
		Ok(matched)
	}

	fn load_combined(&self, b: &mut FuncBuilder, iter: VarId, left_outputs: &[Expr]) -> Vec<Expr> {
		let mut combined = left_outputs.to_vec();
		for (i, ty) in self.right_types.iter().enumerate() {
			let var = b.let_(
				format!("build{i}"),
				SlotType::Scalar(*ty),
				Expr::call(Builtin::RowIterColumn, vec![Expr::Var(iter), Expr::int8(i as i64)]),
			);
			combined.push(Expr::Var(var));
		}
		combined
	}

	pub fn merge_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		if pipeline == self.build_pipeline {
			b.eval(Expr::call(
				Builtin::JoinMerge,
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
