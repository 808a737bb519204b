// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Operator translators.
//!
//! Translation walks the physical plan, splits it into pipelines and
//! has every operator emit its slice of generated code through three
//! callbacks per pipeline it participates in: state initialization,
//! per-row work and state merge (plus a serial teardown for work that
//! must wait until all workers merged). Operators never execute rows
//! themselves; they only describe, in IR, what execution will do.

mod aggregate;
mod dml;
mod filter;
mod join;
mod map;
mod output;
mod scan;
mod sort;
mod take;

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smelt_catalog::Catalog;
use smelt_type::{Result, Type, diagnostic::compile, diagnostic::internal, error};
use tracing::{debug, instrument};

pub use aggregate::AggregateTranslator;
pub use dml::{DeleteTranslator, InsertTranslator, UpdateTranslator};
pub use filter::FilterTranslator;
pub use join::JoinTranslator;
pub use map::MapTranslator;
pub use output::OutputTranslator;
pub use scan::ScanTranslator;
pub use sort::SortTranslator;
pub use take::TakeTranslator;

use crate::{
	exec::ExecutableQuery,
	feature::{OperatingUnitKind, StaticFeature},
	ir::{Expr, FuncBuilder, FuncId, Module, VarId},
	pipeline::{Pipeline, PipelineId, QuerySlot, SlotType, StateSlot},
	plan::{Expression, PhysicalPlan},
	settings::EngineSettings,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TranslatorId(pub usize);

impl Display for TranslatorId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "t{}", self.0)
	}
}

/// Compile a physical plan into an executable query: pipelines plus the
/// generated module both backends can run.
#[instrument(level = "debug", skip_all, name = "compile")]
pub fn compile(plan: &PhysicalPlan, catalog: &Catalog, settings: &EngineSettings) -> Result<ExecutableQuery> {
	let output_types = plan.output_types(catalog)?;
	let mut ctx = CompilationContext::new(catalog, settings);
	let root = ctx.new_pipeline();
	if plan.is_mutation() {
		ctx.prepare(plan, root)?;
	} else {
		output::prepare_output(&mut ctx, plan, root)?;
	}
	let query = ctx.finish(output_types)?;
	debug!(
		pipelines = query.pipelines().len(),
		funcs = query.module().funcs.len(),
		"plan translated"
	);
	Ok(query)
}

/// Shared state of one translation run.
pub struct CompilationContext<'a> {
	pub catalog: &'a Catalog,
	pub settings: &'a EngineSettings,
	pub module: Module,
	pub pipelines: Vec<Pipeline>,
	translators: Vec<Option<Translator>>,
	names: Vec<&'static str>,
	query_slots: Vec<StateSlot>,
	static_features: Vec<StaticFeature>,
}

impl<'a> CompilationContext<'a> {
	pub fn new(catalog: &'a Catalog, settings: &'a EngineSettings) -> Self {
		Self {
			catalog,
			settings,
			module: Module::default(),
			pipelines: Vec::new(),
			translators: Vec::new(),
			names: Vec::new(),
			query_slots: Vec::new(),
			static_features: Vec::new(),
		}
	}

	pub fn new_pipeline(&mut self) -> PipelineId {
		let id = PipelineId(self.pipelines.len());
		self.pipelines.push(Pipeline::new(id));
		id
	}

	/// Reserve a translator id and register it in the pipeline's chain.
	/// The caller fills the slot once its children are prepared.
	pub fn reserve(&mut self, name: &'static str, pipeline: PipelineId) -> TranslatorId {
		let id = TranslatorId(self.translators.len());
		self.translators.push(None);
		self.names.push(name);
		self.pipelines[pipeline.0].translators.push(id);
		id
	}

	/// Register an already-reserved translator in a second pipeline.
	pub fn also_register(&mut self, id: TranslatorId, pipeline: PipelineId) {
		self.pipelines[pipeline.0].translators.push(id);
	}

	pub fn install(&mut self, id: TranslatorId, translator: Translator) {
		self.translators[id.0] = Some(translator);
	}

	pub fn translator(&self, id: TranslatorId) -> Result<&Translator> {
		self.translators
			.get(id.0)
			.and_then(Option::as_ref)
			.ok_or_else(|| error!(internal::internal(format!("translator {id} not installed"))))
	}

	pub fn declare_query_slot(&mut self, name: impl Into<String>, ty: SlotType, owner: TranslatorId) -> QuerySlot {
		self.query_slots.push(StateSlot {
			name: name.into(),
			ty,
			owner,
		});
		QuerySlot(self.query_slots.len() - 1)
	}

	pub fn add_features(
		&mut self,
		translator: TranslatorId,
		pipeline: PipelineId,
		pairs: &[(Type, OperatingUnitKind)],
	) {
		if !self.settings.record_features {
			return;
		}
		for (ty, kind) in pairs {
			self.static_features.push(StaticFeature {
				translator,
				pipeline,
				ty: *ty,
				kind: *kind,
			});
		}
	}

	pub fn record_features(&self) -> bool {
		self.settings.record_features
	}

	/// Build translators for a plan subtree into the given pipeline.
	pub fn prepare(&mut self, plan: &PhysicalPlan, pipeline: PipelineId) -> Result<TranslatorId> {
		match plan {
			PhysicalPlan::TableScan(node) => scan::prepare(self, node, pipeline),
			PhysicalPlan::Filter(node) => filter::prepare(self, node, pipeline),
			PhysicalPlan::Map(node) => map::prepare(self, node, pipeline),
			PhysicalPlan::Aggregate(node) => aggregate::prepare(self, node, pipeline),
			PhysicalPlan::Sort(node) => sort::prepare(self, node, pipeline),
			PhysicalPlan::Take(node) => take::prepare(self, node, pipeline),
			PhysicalPlan::Join(node) => join::prepare(self, node, pipeline),
			PhysicalPlan::Insert(node) => dml::prepare_insert(self, node, pipeline),
			PhysicalPlan::Update(node) => dml::prepare_update(self, node, pipeline),
			PhysicalPlan::Delete(node) => dml::prepare_delete(self, node, pipeline),
		}
	}

	/// Output column types of a child plan, resolved here so translators
	/// do not each re-walk the catalog.
	pub fn child_types(&self, plan: &PhysicalPlan) -> Result<Vec<Type>> {
		plan.output_types(self.catalog)
	}

	/// Emit every generated function and assemble the executable query.
	pub fn finish(mut self, output_types: Vec<Type>) -> Result<ExecutableQuery> {
		// query-wide state setup and teardown
		let translator_ids: Vec<TranslatorId> = (0..self.translators.len()).map(TranslatorId).collect();
		let query_init = {
			let mut b = FuncBuilder::new("query_init");
			for id in &translator_ids {
				self.translator(*id)?.initialize_query_state(&mut b)?;
			}
			self.add_fn(b)
		};
		let query_teardown = {
			let mut b = FuncBuilder::new("query_teardown");
			for id in &translator_ids {
				self.translator(*id)?.teardown_query_state(&mut b)?;
			}
			self.add_fn(b)
		};

		for i in 0..self.pipelines.len() {
			let pipeline = self.pipelines[i].clone();
			let pid = pipeline.id;

			let init_fn = {
				let mut b = FuncBuilder::new(format!("{pid}_init"));
				for tid in &pipeline.translators {
					self.translator(*tid)?.initialize_pipeline_state(pid, &mut b)?;
				}
				self.add_fn(b)
			};
			let work_fn = {
				let mut b = FuncBuilder::new(format!("{pid}_work"));
				let begin = b.param("begin_block", SlotType::Scalar(Type::Int8));
				let end = b.param("end_block", SlotType::Scalar(Type::Int8));
				let mut wc = WorkContext::new(&pipeline, begin, end);
				wc.consume(&self, &mut b)?;
				b.return_();
				self.add_fn(b)
			};
			let merge_fn = {
				let mut b = FuncBuilder::new(format!("{pid}_merge"));
				for tid in &pipeline.translators {
					self.translator(*tid)?.merge_pipeline_state(pid, &mut b)?;
				}
				self.add_fn(b)
			};
			let teardown_fn = {
				let mut b = FuncBuilder::new(format!("{pid}_teardown"));
				for tid in &pipeline.translators {
					self.translator(*tid)?.teardown_pipeline_state(pid, &mut b)?;
				}
				self.add_fn(b)
			};

			let p = &mut self.pipelines[i];
			p.init_fn = init_fn;
			p.work_fn = work_fn;
			p.merge_fn = merge_fn;
			p.teardown_fn = teardown_fn;
		}

		let names = self.names.iter().map(|n| n.to_string()).collect();
		Ok(ExecutableQuery::new(
			self.module,
			self.pipelines,
			query_init,
			query_teardown,
			self.query_slots.len(),
			output_types,
			self.static_features,
			names,
		))
	}

	fn add_fn(&mut self, builder: FuncBuilder) -> Option<FuncId> {
		if builder.is_empty() {
			return None;
		}
		Some(self.module.add_func(builder.finish()))
	}
}

/// Per-row code generation cursor: which translator consumes next, and
/// what the current row looks like to it.
pub struct WorkContext<'a> {
	pub pipeline: &'a Pipeline,
	pos: usize,
	/// Current row columns, as IR expressions over emitted variables.
	pub outputs: Vec<Expr>,
	/// Storage slot of the current row, when the source is a scan.
	pub slot: Option<Expr>,
	pub begin: VarId,
	pub end: VarId,
}

impl<'a> WorkContext<'a> {
	pub fn new(pipeline: &'a Pipeline, begin: VarId, end: VarId) -> Self {
		Self {
			pipeline,
			pos: pipeline.translators.len(),
			outputs: Vec::new(),
			slot: None,
			begin,
			end,
		}
	}

	/// Emit the next translator's per-row work. Restores the row context
	/// afterwards, so a translator may consume more than once to emit
	/// alternative downstream paths (left joins do).
	pub fn consume(&mut self, ctx: &CompilationContext<'_>, b: &mut FuncBuilder) -> Result<()> {
		if self.pos == 0 {
			return Ok(());
		}
		let saved_pos = self.pos;
		let saved_outputs = self.outputs.clone();
		let saved_slot = self.slot.clone();

		self.pos -= 1;
		let id = self.pipeline.translators[self.pos];
		let out = ctx.translator(id)?.perform_pipeline_work(ctx, self, b);

		self.pos = saved_pos;
		self.outputs = saved_outputs;
		self.slot = saved_slot;
		out
	}
}

/// Lower a plan expression over the current row into IR.
pub fn translate_expression(expr: &Expression, inputs: &[Expr]) -> Result<Expr> {
	match expr {
		Expression::Column(i) => inputs
			.get(*i)
			.cloned()
			.ok_or_else(|| error!(compile::unsupported_expression(format!("column ordinal {i} out of range")))),
		Expression::Constant(v) => Ok(Expr::Const(v.clone())),
		Expression::Binary {
			op,
			left,
			right,
		} => Ok(Expr::binary(*op, translate_expression(left, inputs)?, translate_expression(right, inputs)?)),
		Expression::Unary {
			op,
			operand,
		} => Ok(Expr::unary(*op, translate_expression(operand, inputs)?)),
	}
}

/// One translator per plan operator. The enum is closed: adding an
/// operator means adding a variant, and match exhaustiveness walks
/// every dispatch site for free.
#[derive(Clone, Debug)]
pub enum Translator {
	Scan(ScanTranslator),
	Filter(FilterTranslator),
	Map(MapTranslator),
	Aggregate(AggregateTranslator),
	Sort(SortTranslator),
	Take(TakeTranslator),
	Join(JoinTranslator),
	Insert(InsertTranslator),
	Update(UpdateTranslator),
	Delete(DeleteTranslator),
	Output(OutputTranslator),
}

impl Translator {
	pub fn initialize_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		match self {
			Translator::Aggregate(t) => t.initialize_query_state(b),
			Translator::Sort(t) => t.initialize_query_state(b),
			Translator::Join(t) => t.initialize_query_state(b),
			_ => Ok(()),
		}
	}

	pub fn teardown_query_state(&self, b: &mut FuncBuilder) -> Result<()> {
		match self {
			Translator::Aggregate(t) => t.teardown_query_state(b),
			Translator::Sort(t) => t.teardown_query_state(b),
			Translator::Join(t) => t.teardown_query_state(b),
			_ => Ok(()),
		}
	}

	pub fn initialize_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		match self {
			Translator::Scan(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Aggregate(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Sort(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Take(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Join(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Insert(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Update(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Delete(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Output(t) => t.initialize_pipeline_state(pipeline, b),
			Translator::Filter(_) | Translator::Map(_) => Ok(()),
		}
	}

	pub fn perform_pipeline_work(
		&self,
		ctx: &CompilationContext<'_>,
		wc: &mut WorkContext<'_>,
		b: &mut FuncBuilder,
	) -> Result<()> {
		match self {
			Translator::Scan(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Filter(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Map(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Aggregate(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Sort(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Take(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Join(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Insert(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Update(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Delete(t) => t.perform_pipeline_work(ctx, wc, b),
			Translator::Output(t) => t.perform_pipeline_work(ctx, wc, b),
		}
	}

	pub fn merge_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		match self {
			Translator::Scan(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Aggregate(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Sort(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Join(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Insert(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Update(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Delete(t) => t.merge_pipeline_state(pipeline, b),
			Translator::Output(t) => t.merge_pipeline_state(pipeline, b),
			_ => Ok(()),
		}
	}

	pub fn teardown_pipeline_state(&self, pipeline: PipelineId, b: &mut FuncBuilder) -> Result<()> {
		match self {
			Translator::Aggregate(t) => t.teardown_pipeline_state(pipeline, b),
			Translator::Sort(t) => t.teardown_pipeline_state(pipeline, b),
			Translator::Join(t) => t.teardown_pipeline_state(pipeline, b),
			_ => Ok(()),
		}
	}
}
