// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	feature::expression_features,
	ir::{Expr, FuncBuilder},
	pipeline::{PipelineId, SlotType},
	plan::{Expression, MapNode},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext, translate_expression},
};

/// Projection: computes a fresh output row from the child's columns.
/// The row slot, when present, passes through untouched so DML parents
/// above a projection still see it.
#[derive(Clone, Debug)]
pub struct MapTranslator {
	projections: Vec<Expression>,
	output_types: Vec<Type>,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &MapNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("Map", pipeline);
	let input = ctx.child_types(&node.input)?;
	let mut features = Vec::new();
	let mut output_types = Vec::with_capacity(node.projections.len());
	for projection in &node.projections {
		expression_features(projection, &input, &mut features);
		output_types.push(projection.result_type(&input)?);
	}
	ctx.add_features(id, pipeline, &features);
	ctx.install(
		id,
		Translator::Map(MapTranslator {
			projections: node.projections.clone(),
			output_types,
		}),
	);
	ctx.prepare(&node.input, pipeline)?;
	Ok(id)
}

impl MapTranslator {
	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let mut outputs = Vec::with_capacity(self.projections.len());
		for (i, (projection, ty)) in self.projections.iter().zip(&self.output_types).enumerate() {
			let expr = translate_expression(projection, &wc.outputs)?;
			let var = b.let_(format!("proj{i}"), SlotType::Scalar(*ty), expr);
			outputs.push(Expr::Var(var));
		}
		wc.outputs = outputs;
		wc.consume(ctx, b)
	}
}
