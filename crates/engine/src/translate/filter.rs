// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::Result;

use crate::{
	feature::expression_features,
	ir::FuncBuilder,
	pipeline::PipelineId,
	plan::{Expression, FilterNode},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext, translate_expression},
};

/// Row filter. A predicate evaluating to null rejects the row, same as
/// false; only a true predicate lets the row through.
#[derive(Clone, Debug)]
pub struct FilterTranslator {
	predicate: Expression,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &FilterNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Filter", pipeline);
	let input = ctx.child_types(&node.input)?;
	let mut features = Vec::new();
	expression_features(&node.predicate, &input, &mut features);
	ctx.add_features(id, pipeline, &features);
	ctx.install(
		id,
		Translator::Filter(FilterTranslator {
			predicate: node.predicate.clone(),
		}),
	);
	ctx.prepare(&node.input, pipeline)?;
	Ok(id)
}

impl FilterTranslator {
	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let predicate = translate_expression(&self.predicate, &wc.outputs)?;
		b.if_then(predicate, |b| wc.consume(ctx, b))
	}
}
