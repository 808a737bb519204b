// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use smelt_catalog::Catalog;
use smelt_core::TableId;
use smelt_type::{Result, Type, diagnostic::compile, error};

use crate::{
	feature::OperatingUnitKind,
	ir::{Expr, FuncBuilder, StateRef, VarId},
	pipeline::{PipelineId, PipelineSlot, SlotType},
	plan::{BinaryOp, DeleteNode, Expression, InsertNode, InsertSource, UnaryOp, UpdateNode},
	runtime::{Builtin, IndexSpec, InserterSpec, ObjectSpec},
	translate::{CompilationContext, Translator, TranslatorId, WorkContext, translate_expression},
};

/// Write-path translators. All three run serial: writes go through the
/// transaction and the rows-affected count is order-free but the index
/// maintenance around each row is not split across workers.
///
/// Index upkeep brackets every change: deletes remove the old row's
/// entries first, inserts add the new row's entries after the table
/// write, and a rejected unique insert aborts the statement with the
/// transaction marked must-abort.
#[derive(Clone, Debug)]
pub struct InsertTranslator {
	common: DmlCommon,
	/// Literal rows when the source is VALUES; `None` when a child plan
	/// streams the rows.
	values: Option<Vec<Vec<Expression>>>,
}

#[derive(Clone, Debug)]
pub struct UpdateTranslator {
	common: DmlCommon,
	assignments: Vec<(usize, Expression)>,
}

#[derive(Clone, Debug)]
pub struct DeleteTranslator {
	common: DmlCommon,
}

/// State every DML translator shares: the inserter object, its handle
/// slot and the rows-affected counter.
#[derive(Clone, Debug)]
struct DmlCommon {
	id: TranslatorId,
	spec: usize,
	column_count: usize,
	index_count: usize,
	inserter_slot: PipelineSlot,
	count_slot: PipelineSlot,
	record: bool,
}

fn inserter_spec(catalog: &Catalog, table: TableId) -> Result<InserterSpec> {
	let def = catalog.table(table)?;
	let indexes = catalog
		.indexes_of(table)
		.into_iter()
		.map(|i| IndexSpec {
			id: i.id,
			name: i.name,
			key_columns: i.key_columns,
			unique: i.unique,
		})
		.collect();
	Ok(InserterSpec {
		table: def.id,
		table_name: def.name.clone(),
		types: def.column_types(),
		column_names: def.columns.iter().map(|c| c.name.clone()).collect(),
		not_null: def.columns.iter().filter(|c| !c.nullable).map(|c| c.index).collect(),
		indexes,
	})
}

fn prepare_common(
	ctx: &mut CompilationContext<'_>,
	name: &'static str,
	table: TableId,
	pipeline: PipelineId,
) -> Result<DmlCommon> {
	let id = ctx.reserve(name, pipeline);
	let spec = inserter_spec(ctx.catalog, table)?;
	let column_count = spec.types.len();
	let index_count = spec.indexes.len();
	let spec = ctx.module.add_object(ObjectSpec::Inserter(spec));
	let p = &mut ctx.pipelines[pipeline.0];
	p.force_serial();
	let inserter_slot = p.declare_slot("dml_inserter", SlotType::Handle, id);
	let count_slot = p.declare_slot("dml_count", SlotType::Scalar(Type::Int8), id);
	Ok(DmlCommon {
		id,
		spec,
		column_count,
		index_count,
		inserter_slot,
		count_slot,
		record: ctx.record_features(),
	})
}

pub fn prepare_insert(ctx: &mut CompilationContext<'_>, node: &InsertNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let common = prepare_common(ctx, "Insert", node.table, pipeline)?;
	let id = common.id;
	let types = ctx.catalog.table(node.table)?.column_types();
	let mut features: Vec<_> = types.iter().map(|ty| (*ty, OperatingUnitKind::TupleInsert)).collect();
	index_features(ctx, node.table, OperatingUnitKind::IndexInsert, &mut features)?;
	ctx.add_features(id, pipeline, &features);

	let values = match &node.source {
		InsertSource::Values(rows) => {
			for row in rows {
				if row.len() != types.len() {
					return Err(error!(compile::unsupported_plan(format!(
						"insert row has {} values, table has {} columns",
						row.len(),
						types.len()
					))));
				}
			}
			Some(rows.clone())
		}
		InsertSource::Select(_) => None,
	};
	ctx.install(
		id,
		Translator::Insert(InsertTranslator {
			common,
			values,
		}),
	);
	if let InsertSource::Select(input) = &node.source {
		ctx.prepare(input, pipeline)?;
	}
	Ok(id)
}

pub fn prepare_update(ctx: &mut CompilationContext<'_>, node: &UpdateNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let common = prepare_common(ctx, "Update", node.table, pipeline)?;
	let id = common.id;
	let types = ctx.catalog.table(node.table)?.column_types();
	let mut features: Vec<_> = types.iter().map(|ty| (*ty, OperatingUnitKind::TupleUpdate)).collect();
	index_features(ctx, node.table, OperatingUnitKind::IndexDelete, &mut features)?;
	index_features(ctx, node.table, OperatingUnitKind::IndexInsert, &mut features)?;
	ctx.add_features(id, pipeline, &features);

	ctx.install(
		id,
		Translator::Update(UpdateTranslator {
			common,
			assignments: node.assignments.clone(),
		}),
	);
	ctx.prepare(&node.input, pipeline)?;
	Ok(id)
}

pub fn prepare_delete(ctx: &mut CompilationContext<'_>, node: &DeleteNode, pipeline: PipelineId) -> Result<TranslatorId> {
	let common = prepare_common(ctx, "Delete", node.table, pipeline)?;
	let id = common.id;
	let types = ctx.catalog.table(node.table)?.column_types();
	let mut features: Vec<_> = types.iter().map(|ty| (*ty, OperatingUnitKind::TupleDelete)).collect();
	index_features(ctx, node.table, OperatingUnitKind::IndexDelete, &mut features)?;
	ctx.add_features(id, pipeline, &features);

	ctx.install(
		id,
		Translator::Delete(DeleteTranslator {
			common,
		}),
	);
	ctx.prepare(&node.input, pipeline)?;
	Ok(id)
}

fn index_features(
	ctx: &CompilationContext<'_>,
	table: TableId,
	kind: OperatingUnitKind,
	out: &mut Vec<(Type, OperatingUnitKind)>,
) -> Result<()> {
	let def = ctx.catalog.table(table)?;
	for index in ctx.catalog.indexes_of(table) {
		let ty = index
			.key_columns
			.first()
			.and_then(|c| def.columns.get(*c))
			.map(|c| c.ty)
			.unwrap_or(Type::Undefined);
		out.push((ty, kind));
	}
	Ok(())
}

impl DmlCommon {
	fn initialize(&self, b: &mut FuncBuilder) {
		b.set_state(
			StateRef::Pipeline(self.inserter_slot),
			Expr::call(Builtin::InserterInit, vec![Expr::int8(self.spec as i64)]),
		);
		b.set_state(StateRef::Pipeline(self.count_slot), Expr::int8(0));
	}

	fn inserter(&self) -> Expr {
		Expr::State(StateRef::Pipeline(self.inserter_slot))
	}

	fn bump_count(&self, b: &mut FuncBuilder) {
		let count = StateRef::Pipeline(self.count_slot);
		b.set_state(count, Expr::binary(BinaryOp::Add, Expr::State(count), Expr::int8(1)));
	}

	/// Fill a freshly acquired write row from the given column values.
	fn fill_row(&self, b: &mut FuncBuilder, name: &str, values: &[Expr]) -> VarId {
		let row = b.let_(name.to_string(), SlotType::Handle, Expr::call(Builtin::RowAcquire, vec![self.inserter()]));
		for (i, value) in values.iter().enumerate() {
			b.eval(Expr::call(Builtin::RowSet, vec![Expr::Var(row), Expr::int8(i as i64), value.clone()]));
		}
		row
	}

	/// Insert the row's entry into every index, aborting the statement
	/// on a rejected unique key.
	fn index_inserts(&self, b: &mut FuncBuilder, row: VarId, slot: VarId) -> Result<()> {
		for ordinal in 0..self.index_count {
			let ok = b.let_(
				format!("idx_ok{ordinal}"),
				SlotType::Scalar(Type::Boolean),
				Expr::call(
					Builtin::IndexInsert,
					vec![self.inserter(), Expr::int8(ordinal as i64), Expr::Var(row), Expr::Var(slot)],
				),
			);
			b.if_then(Expr::unary(UnaryOp::Not, Expr::Var(ok)), |b| {
				b.eval(Expr::call(
					Builtin::AbortUniqueViolation,
					vec![self.inserter(), Expr::int8(ordinal as i64)],
				));
				Ok(())
			})?;
		}
		Ok(())
	}

	fn index_deletes(&self, b: &mut FuncBuilder, row: VarId, slot: VarId) {
		for ordinal in 0..self.index_count {
			b.eval(Expr::call(
				Builtin::IndexDelete,
				vec![self.inserter(), Expr::int8(ordinal as i64), Expr::Var(row), Expr::Var(slot)],
			));
		}
	}

	fn merge(&self, b: &mut FuncBuilder) {
		let count = StateRef::Pipeline(self.count_slot);
		b.eval(Expr::call(Builtin::RowsAffectedAdd, vec![Expr::State(count)]));
		if self.record {
			b.eval(Expr::call(
				Builtin::FeatureRecord,
				vec![Expr::int8(self.id.0 as i64), Expr::int8(0), Expr::State(count)],
			));
		}
		b.eval(Expr::call(Builtin::HandleFree, vec![self.inserter()]));
	}
}

impl InsertTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.initialize(b);
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		_ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		match &self.values {
			// VALUES: this translator is the pipeline source and emits
			// one straight-line insert per literal row
			Some(rows) => {
				for row in rows {
					let mut values = Vec::with_capacity(row.len());
					for expr in row {
						values.push(translate_expression(expr, &[])?);
					}
					self.emit_insert(b, &values)?;
				}
				Ok(())
			}
			None => {
				if wc.outputs.len() != self.common.column_count {
					return Err(error!(compile::unsupported_plan(format!(
						"insert source produces {} columns, table has {}",
						wc.outputs.len(),
						self.common.column_count
					))));
				}
				let values = wc.outputs.clone();
				self.emit_insert(b, &values)
			}
		}
	}

	fn emit_insert(&self, b: &mut FuncBuilder, values: &[Expr]) -> Result<()> {
		let c = &self.common;
		let row = c.fill_row(b, "ins_row", values);
		b.eval(Expr::call(Builtin::RowCheckNotNull, vec![c.inserter(), Expr::Var(row)]));
		let slot = b.let_(
			"ins_slot",
			SlotType::RowSlot,
			Expr::call(Builtin::TableInsert, vec![c.inserter(), Expr::Var(row)]),
		);
		c.index_inserts(b, row, slot)?;
		c.bump_count(b);
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(row)]));
		Ok(())
	}

	pub fn merge_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.merge(b);
		Ok(())
	}
}

impl UpdateTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.initialize(b);
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		_ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let c = &self.common;
		let slot_expr = wc
			.slot
			.clone()
			.ok_or_else(|| error!(compile::unsupported_plan("update input does not scan the target table")))?;
		let slot = b.let_("upd_slot", SlotType::RowSlot, slot_expr);

		if wc.outputs.len() < c.column_count {
			return Err(error!(compile::unsupported_plan("update input is narrower than the target table")));
		}
		let old_values = wc.outputs[..c.column_count].to_vec();
		let old_row = c.fill_row(b, "old_row", &old_values);

		let mut new_values = old_values;
		for (column, expr) in &self.assignments {
			if *column >= new_values.len() {
				return Err(error!(compile::unsupported_plan(format!("assignment to column ordinal {column} out of range"))));
			}
			new_values[*column] = translate_expression(expr, &wc.outputs)?;
		}
		let new_row = c.fill_row(b, "new_row", &new_values);
		b.eval(Expr::call(Builtin::RowCheckNotNull, vec![c.inserter(), Expr::Var(new_row)]));

		c.index_deletes(b, old_row, slot);
		b.eval(Expr::call(Builtin::TableUpdate, vec![c.inserter(), Expr::Var(slot), Expr::Var(new_row)]));
		c.index_inserts(b, new_row, slot)?;
		c.bump_count(b);
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(old_row)]));
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(new_row)]));
		Ok(())
	}

	pub fn merge_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.merge(b);
		Ok(())
	}
}

impl DeleteTranslator {
	pub fn initialize_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.initialize(b);
		Ok(())
	}

	pub fn perform_pipeline_work(
		&self,
		_ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		let c = &self.common;
		let slot_expr = wc
			.slot
			.clone()
			.ok_or_else(|| error!(compile::unsupported_plan("delete input does not scan the target table")))?;
		let slot = b.let_("del_slot", SlotType::RowSlot, slot_expr);

		if wc.outputs.len() < c.column_count {
			return Err(error!(compile::unsupported_plan("delete input is narrower than the target table")));
		}
		let values = wc.outputs[..c.column_count].to_vec();
		let row = c.fill_row(b, "del_row", &values);
		c.index_deletes(b, row, slot);
		let deleted = b.let_(
			"del_ok",
			SlotType::Scalar(Type::Boolean),
			Expr::call(Builtin::TableDelete, vec![c.inserter(), Expr::Var(slot)]),
		);
		b.if_then(Expr::Var(deleted), |b| {
			c.bump_count(b);
			Ok(())
		})?;
		b.eval(Expr::call(Builtin::HandleFree, vec![Expr::Var(row)]));
		Ok(())
	}

	pub fn merge_pipeline_state(&self, _pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		self.common.merge(b);
		Ok(())
	}
}
