// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! The execution driver.
//!
//! Runs a compiled query pipeline by pipeline: per-worker init, work
//! over a partition of the source table's blocks, serial merges of the
//! worker states and a serial teardown. Cancellation and the
//! transaction's must-abort flag are checked at pipeline boundaries,
//! never mid-row, so rows already delivered stay consistent.

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use crossbeam_channel::{Receiver, bounded};
use parking_lot::RwLock;
use rayon::prelude::*;
use smelt_core::Transaction;
use smelt_type::{Result, Type, Value, diagnostic::execution, diagnostic::transaction, error};
use tracing::{debug, instrument, trace};

use crate::{
	bytecode::{BytecodeVm, lower},
	feature::{FeatureSink, StaticFeature},
	interpret::Interpreter,
	ir::{FuncId, Module},
	pipeline::{Pipeline, execution_order},
	runtime::{ObjectArena, OutputSink, RtValue, RuntimeCtx},
	settings::EngineSettings,
};

/// An execution backend: something that can run one generated function
/// against the runtime context. Both backends execute the same builtin
/// library, so a query may switch backends between pipelines.
pub trait Backend: Send + Sync {
	fn name(&self) -> &'static str;

	fn run(&self, func: FuncId, args: &[RtValue], ctx: &mut RuntimeCtx<'_>) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
	/// Tree-walk the IR.
	Interpreted,
	/// Lower to bytecode up front, then run the VM.
	Compiled,
	/// Start interpreted, lower in a background thread and switch to the
	/// VM at the first pipeline boundary where it is ready.
	Interleaved,
}

/// Everything a single query run needs besides the compiled query
/// itself: the transaction, settings, the result callback, the feature
/// sink and a cancellation flag the client may trip from another thread.
pub struct ExecutionContext {
	txn: Arc<dyn Transaction>,
	settings: EngineSettings,
	features: FeatureSink,
	callback: Option<Box<dyn FnMut(Vec<Vec<Value>>) + Send>>,
	cancel: Arc<AtomicBool>,
}

impl ExecutionContext {
	pub fn new(txn: Arc<dyn Transaction>, settings: EngineSettings) -> Self {
		Self {
			txn,
			settings,
			features: FeatureSink::new(),
			callback: None,
			cancel: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Install the result batch callback. Queries without one (DML) drop
	/// any emitted rows.
	pub fn on_batch(mut self, callback: impl FnMut(Vec<Vec<Value>>) + Send + 'static) -> Self {
		self.callback = Some(Box::new(callback));
		self
	}

	/// Handle the client can trip to stop the query at the next pipeline
	/// boundary.
	pub fn cancel_flag(&self) -> Arc<AtomicBool> {
		Arc::clone(&self.cancel)
	}

	pub fn features(&self) -> &FeatureSink {
		&self.features
	}

	pub fn transaction(&self) -> &dyn Transaction {
		self.txn.as_ref()
	}
}

/// A fully translated query, ready to run any number of times.
pub struct ExecutableQuery {
	module: Arc<Module>,
	pipelines: Vec<Pipeline>,
	query_init: Option<FuncId>,
	query_teardown: Option<FuncId>,
	query_slot_count: usize,
	output_types: Vec<Type>,
	static_features: Vec<StaticFeature>,
	translator_names: Vec<String>,
}

impl ExecutableQuery {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		module: Module,
		pipelines: Vec<Pipeline>,
		query_init: Option<FuncId>,
		query_teardown: Option<FuncId>,
		query_slot_count: usize,
		output_types: Vec<Type>,
		static_features: Vec<StaticFeature>,
		translator_names: Vec<String>,
	) -> Self {
		Self {
			module: Arc::new(module),
			pipelines,
			query_init,
			query_teardown,
			query_slot_count,
			output_types,
			static_features,
			translator_names,
		}
	}

	pub fn module(&self) -> &Module {
		&self.module
	}

	pub fn pipelines(&self) -> &[Pipeline] {
		&self.pipelines
	}

	pub fn output_types(&self) -> &[Type] {
		&self.output_types
	}

	pub fn static_features(&self) -> &[StaticFeature] {
		&self.static_features
	}

	/// Operator name per translator id, in translation order.
	pub fn translator_names(&self) -> &[String] {
		&self.translator_names
	}

	/// Run the query to completion. Returns the number of rows the
	/// transaction reports as affected, which is zero for reads.
	#[instrument(level = "debug", skip_all, fields(mode = ?mode))]
	pub fn run(&self, ctx: &mut ExecutionContext, mode: ExecutionMode) -> Result<u64> {
		if ctx.txn.is_must_abort() {
			return Err(error!(transaction::must_abort()));
		}

		let mut backend = BackendSlot::new(Arc::clone(&self.module), mode)?;
		let callback = ctx.callback.take().unwrap_or_else(|| Box::new(|_| {}));
		let output = OutputSink::new(ctx.settings.output_batch_size, callback);
		let query_state = RwLock::new(vec![RtValue::Nothing; self.query_slot_count]);
		let arena = ObjectArena::new();

		let run = Run {
			query: self,
			txn: ctx.txn.as_ref(),
			settings: &ctx.settings,
			features: &ctx.features,
			output: &output,
			query_state: &query_state,
			arena: &arena,
		};

		run.serial(&backend, self.query_init)?;
		for pid in execution_order(&self.pipelines) {
			if ctx.cancel.load(Ordering::Relaxed) {
				return Err(error!(execution::cancelled()));
			}
			if ctx.txn.is_must_abort() {
				return Err(error!(transaction::must_abort()));
			}
			backend.poll()?;
			run.pipeline(&backend, &self.pipelines[pid.0])?;
		}
		run.serial(&backend, self.query_teardown)?;

		output.flush();
		Ok(ctx.txn.rows_affected())
	}
}

/// Shared borrows one query run threads through every phase.
struct Run<'a> {
	query: &'a ExecutableQuery,
	txn: &'a dyn Transaction,
	settings: &'a EngineSettings,
	features: &'a FeatureSink,
	output: &'a OutputSink,
	query_state: &'a RwLock<Vec<RtValue>>,
	arena: &'a ObjectArena,
}

impl Run<'_> {
	fn ctx<'b>(&'b self, pipeline_state: &'b mut Vec<RtValue>) -> RuntimeCtx<'b> {
		RuntimeCtx {
			objects: &self.query.module.objects,
			txn: self.txn,
			arena: self.arena,
			query_state: self.query_state,
			pipeline_state,
			output: self.output,
			features: self.features,
		}
	}

	/// Run one optional function with no arguments and no pipeline state.
	fn serial(&self, backend: &BackendSlot, func: Option<FuncId>) -> Result<()> {
		let Some(func) = func else {
			return Ok(());
		};
		let mut state = Vec::new();
		backend.current().run(func, &[], &mut self.ctx(&mut state))
	}

	fn pipeline(&self, backend: &BackendSlot, pipeline: &Pipeline) -> Result<()> {
		let ranges = self.partition(pipeline)?;
		debug!(
			pipeline = %pipeline.id,
			workers = ranges.len(),
			backend = backend.current().name(),
			"running pipeline"
		);

		let worker = |range: &(u32, u32)| -> Result<Vec<RtValue>> {
			let mut state = vec![RtValue::Nothing; pipeline.slots.len()];
			{
				let mut ctx = self.ctx(&mut state);
				if let Some(init) = pipeline.init_fn {
					backend.current().run(init, &[], &mut ctx)?;
				}
				if let Some(work) = pipeline.work_fn {
					let args =
						[RtValue::Value(Value::int8(range.0 as i64)), RtValue::Value(Value::int8(range.1 as i64))];
					backend.current().run(work, &args, &mut ctx)?;
				}
			}
			Ok(state)
		};

		let worker_states: Vec<Vec<RtValue>> = if ranges.len() > 1 {
			ranges.par_iter().map(worker).collect::<Result<_>>()?
		} else {
			ranges.iter().map(worker).collect::<Result<_>>()?
		};

		// merges run serially, one worker state at a time
		if let Some(merge) = pipeline.merge_fn {
			for mut state in worker_states {
				backend.current().run(merge, &[], &mut self.ctx(&mut state))?;
			}
		}
		if let Some(teardown) = pipeline.teardown_fn {
			let mut state = vec![RtValue::Nothing; pipeline.slots.len()];
			backend.current().run(teardown, &[], &mut self.ctx(&mut state))?;
		}
		trace!(pipeline = %pipeline.id, "pipeline done");
		Ok(())
	}

	/// Contiguous block ranges, one per worker. Pipelines without a scan
	/// source get a single empty range.
	fn partition(&self, pipeline: &Pipeline) -> Result<Vec<(u32, u32)>> {
		let Some(table) = pipeline.source_table else {
			return Ok(vec![(0, 0)]);
		};
		let blocks = self.txn.storage().block_count(table)?;
		let workers = if pipeline.is_parallel() {
			self.settings.worker_count.max(1).min(blocks.max(1) as usize)
		} else {
			1
		};
		if workers <= 1 {
			return Ok(vec![(0, blocks)]);
		}
		let per_worker = blocks.div_ceil(workers as u32);
		let mut ranges = Vec::with_capacity(workers);
		let mut begin = 0;
		while begin < blocks {
			let end = (begin + per_worker).min(blocks);
			ranges.push((begin, end));
			begin = end;
		}
		Ok(ranges)
	}
}

/// The active backend plus, in interleaved mode, the channel the
/// lowering thread reports on.
struct BackendSlot {
	current: Box<dyn Backend>,
	pending: Option<Receiver<Result<BytecodeVm>>>,
}

impl BackendSlot {
	fn new(module: Arc<Module>, mode: ExecutionMode) -> Result<Self> {
		match mode {
			ExecutionMode::Interpreted => Ok(Self {
				current: Box::new(Interpreter::new(module)),
				pending: None,
			}),
			ExecutionMode::Compiled => {
				let program = lower(&module)?;
				Ok(Self {
					current: Box::new(BytecodeVm::new(Arc::new(program))),
					pending: None,
				})
			}
			ExecutionMode::Interleaved => {
				let (tx, rx) = bounded(1);
				let lowering_input = Arc::clone(&module);
				std::thread::spawn(move || {
					let result = lower(&lowering_input).map(|p| BytecodeVm::new(Arc::new(p)));
					// receiver may be gone if the query finished first
					let _ = tx.send(result);
				});
				Ok(Self {
					current: Box::new(Interpreter::new(module)),
					pending: Some(rx),
				})
			}
		}
	}

	fn current(&self) -> &dyn Backend {
		self.current.as_ref()
	}

	/// Switch to the bytecode backend if lowering finished. A lowering
	/// failure fails the query: both backends must agree on what is
	/// executable.
	fn poll(&mut self) -> Result<()> {
		let Some(rx) = &self.pending else {
			return Ok(());
		};
		match rx.try_recv() {
			Ok(result) => {
				self.pending = None;
				let vm = result?;
				debug!(from = self.current.name(), to = vm.name(), "switching backend");
				self.current = Box::new(vm);
				Ok(())
			}
			Err(_) => Ok(()),
		}
	}
}
