// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_type::{Result, Type};

use crate::{
	feature::OperatingUnitKind,
	ir::{Expr, FuncBuilder, StateRef},
	pipeline::{PipelineId, PipelineSlot, SlotType},
	plan::{BinaryOp, TableScanNode, UnaryOp},
	runtime::{Builtin, ObjectSpec, ScanSpec},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext},
};

/// Sequential scan: drives the pipeline's row loop over a contiguous
/// block range. The range arrives as work-function arguments, which is
/// all the parallel driver needs to partition the table.
#[derive(Clone, Debug)]
pub struct ScanTranslator {
	id: TranslatorId,
	spec: usize,
	types: Vec<Type>,
	rows_slot: PipelineSlot,
	record: bool,
}

pub fn prepare(ctx: &mut CompilationContext<'_>, node: &TableScanNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let id = ctx.reserve("TableScan", pipeline);
	let table = ctx.catalog.table(node.table)?;
	let types = table.column_types();
	let spec = ctx.module.add_object(ObjectSpec::Scan(ScanSpec {
		table: table.id,
		types: types.clone(),
	}));

	let p = &mut ctx.pipelines[pipeline.0];
	p.source_table = Some(table.id);
	if !node.parallel {
		p.force_serial();
	}
	let rows_slot = p.declare_slot("scan_rows", SlotType::Scalar(Type::Int8), id);

	ctx.add_features(id, pipeline, &[(types.first().copied().unwrap_or(Type::Undefined), OperatingUnitKind::TupleScan)]);
	ctx.install(
		id,
		Translator::Scan(ScanTranslator {
			id,
			spec,
			types,
			rows_slot,
			record: ctx.record_features(),
		}),
	);
	Ok(id)
}

impl ScanTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		b.set_state(StateRef::Pipeline(self.rows_slot), Expr::int8(0));
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let iter = b.let_(
			"scan_iter",
			SlotType::Handle,
			Expr::call(
				Builtin::TableIterInit,
				vec![Expr::int8(self.spec as i64), Expr::Var(wc.begin), Expr::Var(wc.end)],
			),
		);
		b.loop_(|b| {
			b.if_then(
				Expr::unary(UnaryOp::Not, Expr::call(Builtin::TableIterAdvance, vec![Expr::Var(iter)])),
				|b| {
					b.break_();
					Ok(())
				},
			)?;
			let mut outputs = Vec::with_capacity(self.types.len());
			for (i, ty) in self.types.iter().enumerate() {
				let var = b.let_(
					format!("col{i}"),
					SlotType::Scalar(*ty),
					Expr::call(Builtin::TableIterColumn, vec![Expr::Var(iter), Expr::int8(i as i64)]),
				);
				outputs.push(Expr::Var(var));
			}
			wc.outputs = outputs;
			wc.slot = Some(Expr::call(Builtin::TableIterSlot, vec![Expr::Var(iter)]));
			if ctx.record_features() {
				let slot = StateRef::Pipeline(self.rows_slot);
				b.set_state(slot, Expr::binary(BinaryOp::Add, Expr::State(slot), Expr::int8(1)));
			}
			wc.consume(ctx, b)
		})?;
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(iter)]));
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
