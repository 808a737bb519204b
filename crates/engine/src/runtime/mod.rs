// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! The runtime builtin library.
//!
//! Generated code performs every side effect through a [`Builtin`]
//! call: storage access, runtime object management, result emission and
//! feature recording. [`dispatch`] is the single entry point both the
//! tree interpreter and the bytecode VM use, so a builtin behaves
//! identically under either backend by construction.

pub mod objects;
pub mod ops;

use std::{
	fmt::{self, Display, Formatter},
	sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use smelt_core::{IndexId, RowSlot, TableId, Transaction};
use smelt_type::{Result, Type, Value, diagnostic::constraint, diagnostic::internal, error};

use crate::{
	feature::{FeatureCounter, FeatureRecord, FeatureSink},
	plan::{AggregateFunc, SortDirection},
	translate::TranslatorId,
};

pub use objects::{AggTable, Inserter, JoinTable, RowIter, RuntimeObject, Sorter, TableIter, WriteRow};

/// Catalog-derived description of one runtime object kind. Specs are
/// resolved at translation time and embedded in the module, so running
/// a query needs no catalog access.
#[derive(Clone, Debug)]
pub enum ObjectSpec {
	Scan(ScanSpec),
	Inserter(InserterSpec),
	Agg(AggSpec),
	Join(JoinSpec),
	Sorter(SorterSpec),
}

#[derive(Clone, Debug)]
pub struct ScanSpec {
	pub table: TableId,
	pub types: Vec<Type>,
}

#[derive(Clone, Debug)]
pub struct IndexSpec {
	pub id: IndexId,
	pub name: String,
	pub key_columns: Vec<usize>,
	pub unique: bool,
}

#[derive(Clone, Debug)]
pub struct InserterSpec {
	pub table: TableId,
	pub table_name: String,
	pub types: Vec<Type>,
	pub column_names: Vec<String>,
	/// Ordinals of columns declared NOT NULL.
	pub not_null: Vec<usize>,
	pub indexes: Vec<IndexSpec>,
}

#[derive(Clone, Debug)]
pub struct AggSpec {
	pub key_count: usize,
	pub aggs: Vec<AggregateFunc>,
}

#[derive(Clone, Debug)]
pub struct JoinSpec {
	pub key_count: usize,
	pub payload_count: usize,
}

#[derive(Clone, Debug)]
pub struct SorterSpec {
	pub keys: Vec<(usize, SortDirection)>,
	pub width: usize,
}

/// Handle to an object in the [`ObjectArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleId(pub usize);

/// A value flowing through generated code: either a SQL scalar or an
/// opaque runtime reference.
#[derive(Clone, Debug)]
pub enum RtValue {
	Value(Value),
	Handle(HandleId),
	Slot(RowSlot),
	Nothing,
}

impl RtValue {
	pub fn value(&self) -> Result<&Value> {
		match self {
			RtValue::Value(v) => Ok(v),
			other => Err(error!(internal::internal(format!("expected scalar, got {other:?}")))),
		}
	}

	pub fn into_value(self) -> Result<Value> {
		match self {
			RtValue::Value(v) => Ok(v),
			other => Err(error!(internal::internal(format!("expected scalar, got {other:?}")))),
		}
	}

	pub fn handle(&self) -> Result<HandleId> {
		match self {
			RtValue::Handle(h) => Ok(*h),
			other => Err(error!(internal::internal(format!("expected handle, got {other:?}")))),
		}
	}

	pub fn slot(&self) -> Result<RowSlot> {
		match self {
			RtValue::Slot(s) => Ok(*s),
			other => Err(error!(internal::internal(format!("expected row slot, got {other:?}")))),
		}
	}

	pub fn index(&self) -> Result<usize> {
		let v = self.value()?;
		v.as_i64()
			.and_then(|i| usize::try_from(i).ok())
			.ok_or_else(|| error!(internal::internal(format!("expected index, got {v}"))))
	}

	pub fn is_truthy(&self) -> bool {
		matches!(self, RtValue::Value(Value::Boolean(true)))
	}
}

/// Allocation arena for runtime objects. Objects sit behind their own
/// mutex so concurrent workers only contend on allocation.
#[derive(Default)]
pub struct ObjectArena {
	objects: RwLock<Vec<Option<Arc<Mutex<RuntimeObject>>>>>,
}

impl ObjectArena {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn alloc(&self, object: RuntimeObject) -> HandleId {
		let mut objects = self.objects.write();
		objects.push(Some(Arc::new(Mutex::new(object))));
		HandleId(objects.len() - 1)
	}

	pub fn get(&self, handle: HandleId) -> Result<Arc<Mutex<RuntimeObject>>> {
		self.objects
			.read()
			.get(handle.0)
			.cloned()
			.flatten()
			.ok_or_else(|| error!(internal::internal(format!("dangling object handle {}", handle.0))))
	}

	/// Remove an object from the arena, transferring ownership to the
	/// caller. Used by the merge builtins to consume their source.
	pub fn take(&self, handle: HandleId) -> Result<RuntimeObject> {
		let entry = self
			.objects
			.write()
			.get_mut(handle.0)
			.and_then(Option::take)
			.ok_or_else(|| error!(internal::internal(format!("dangling object handle {}", handle.0))))?;
		match Arc::try_unwrap(entry) {
			Ok(mutex) => Ok(mutex.into_inner()),
			Err(_) => Err(error!(internal::internal("object taken while shared"))),
		}
	}

	pub fn free(&self, handle: HandleId) {
		if let Some(entry) = self.objects.write().get_mut(handle.0) {
			*entry = None;
		}
	}
}

/// Batched result sink. Rows buffer until the batch fills, then the
/// callback fires; [`OutputSink::flush`] drains the remainder at query
/// end.
pub struct OutputSink {
	batch_size: usize,
	batch: Mutex<Vec<Vec<Value>>>,
	callback: Mutex<Box<dyn FnMut(Vec<Vec<Value>>) + Send>>,
}

impl OutputSink {
	pub fn new(batch_size: usize, callback: Box<dyn FnMut(Vec<Vec<Value>>) + Send>) -> Self {
		Self {
			batch_size: batch_size.max(1),
			batch: Mutex::new(Vec::new()),
			callback: Mutex::new(callback),
		}
	}

	pub fn emit(&self, row: Vec<Value>) {
		let full = {
			let mut batch = self.batch.lock();
			batch.push(row);
			batch.len() >= self.batch_size
		};
		if full {
			self.flush();
		}
	}

	pub fn flush(&self) {
		let batch = std::mem::take(&mut *self.batch.lock());
		if !batch.is_empty() {
			(self.callback.lock())(batch);
		}
	}
}

/// Execution-side context threaded through every builtin call.
pub struct RuntimeCtx<'a> {
	pub objects: &'a [ObjectSpec],
	pub txn: &'a dyn Transaction,
	pub arena: &'a ObjectArena,
	/// Query-wide state slots. Written only during serial phases.
	pub query_state: &'a RwLock<Vec<RtValue>>,
	/// The executing worker's pipeline-state arena.
	pub pipeline_state: &'a mut Vec<RtValue>,
	pub output: &'a OutputSink,
	pub features: &'a FeatureSink,
}

/// The closed set of runtime builtins generated code may call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
	// table scan
	TableIterInit,
	TableIterAdvance,
	TableIterColumn,
	TableIterSlot,
	// write path
	InserterInit,
	RowAcquire,
	RowSet,
	RowGet,
	RowCheckNotNull,
	TableInsert,
	TableUpdate,
	TableDelete,
	IndexInsert,
	IndexDelete,
	AbortUniqueViolation,
	// aggregation
	AggInit,
	AggUpdate,
	AggMerge,
	AggIterInit,
	// joins
	JoinInit,
	JoinInsert,
	JoinMerge,
	JoinProbe,
	// sorting
	SorterInit,
	SorterInsert,
	SorterMerge,
	SorterSort,
	SorterIterInit,
	// materialized-row cursors
	RowIterAdvance,
	RowIterColumn,
	// context
	ResultEmit,
	RowsAffectedAdd,
	FeatureRecord,
	ObjectCount,
	HandleFree,
}

impl Display for Builtin {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let s = match self {
			Builtin::TableIterInit => "table_iter_init",
			Builtin::TableIterAdvance => "table_iter_advance",
			Builtin::TableIterColumn => "table_iter_column",
			Builtin::TableIterSlot => "table_iter_slot",
			Builtin::InserterInit => "inserter_init",
			Builtin::RowAcquire => "row_acquire",
			Builtin::RowSet => "row_set",
			Builtin::RowGet => "row_get",
			Builtin::RowCheckNotNull => "row_check_not_null",
			Builtin::TableInsert => "table_insert",
			Builtin::TableUpdate => "table_update",
			Builtin::TableDelete => "table_delete",
			Builtin::IndexInsert => "index_insert",
			Builtin::IndexDelete => "index_delete",
			Builtin::AbortUniqueViolation => "abort_unique_violation",
			Builtin::AggInit => "agg_init",
			Builtin::AggUpdate => "agg_update",
			Builtin::AggMerge => "agg_merge",
			Builtin::AggIterInit => "agg_iter_init",
			Builtin::JoinInit => "join_init",
			Builtin::JoinInsert => "join_insert",
			Builtin::JoinMerge => "join_merge",
			Builtin::JoinProbe => "join_probe",
			Builtin::SorterInit => "sorter_init",
			Builtin::SorterInsert => "sorter_insert",
			Builtin::SorterMerge => "sorter_merge",
			Builtin::SorterSort => "sorter_sort",
			Builtin::SorterIterInit => "sorter_iter_init",
			Builtin::RowIterAdvance => "row_iter_advance",
			Builtin::RowIterColumn => "row_iter_column",
			Builtin::ResultEmit => "result_emit",
			Builtin::RowsAffectedAdd => "rows_affected_add",
			Builtin::FeatureRecord => "feature_record",
			Builtin::ObjectCount => "object_count",
			Builtin::HandleFree => "handle_free",
		};
		f.write_str(s)
	}
}

fn arg(args: &[RtValue], i: usize) -> Result<&RtValue> {
	args.get(i).ok_or_else(|| error!(internal::internal(format!("builtin argument {i} missing"))))
}

fn spec<'a>(ctx: &RuntimeCtx<'a>, idx: usize) -> Result<&'a ObjectSpec> {
	ctx.objects
		.get(idx)
		.ok_or_else(|| error!(internal::internal(format!("object spec {idx} out of range"))))
}

macro_rules! with_object {
	($ctx:expr, $handle:expr, $variant:ident, $name:ident => $body:expr) => {{
		let cell = $ctx.arena.get($handle)?;
		let mut guard = cell.lock();
		match &mut *guard {
			RuntimeObject::$variant($name) => $body,
			other => {
				return Err(error!(internal::internal(format!(
					concat!("expected ", stringify!($variant), ", got {:?}"),
					std::mem::discriminant(other)
				))));
			}
		}
	}};
}

/// Execute one builtin. Arguments arrive fully evaluated; the result is
/// `Nothing` for effect-only builtins.
pub fn dispatch(builtin: Builtin, args: Vec<RtValue>, ctx: &mut RuntimeCtx<'_>) -> Result<RtValue> {
	match builtin {
		Builtin::TableIterInit => {
			let ObjectSpec::Scan(scan) = spec(ctx, arg(&args, 0)?.index()?)? else {
				return Err(error!(internal::internal("object spec is not a scan")));
			};
			let begin = arg(&args, 1)?.index()? as u32;
			let end = arg(&args, 2)?.index()? as u32;
			let iter = TableIter::new(scan, begin, end);
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::TableIter(iter))))
		}
		Builtin::TableIterAdvance => {
			let handle = arg(&args, 0)?.handle()?;
			let more = with_object!(ctx, handle, TableIter, iter => iter.advance(ctx.txn.storage())?);
			Ok(RtValue::Value(Value::bool(more)))
		}
		Builtin::TableIterColumn => {
			let handle = arg(&args, 0)?.handle()?;
			let col = arg(&args, 1)?.index()?;
			let value = with_object!(ctx, handle, TableIter, iter => iter.column(col)?);
			Ok(RtValue::Value(value))
		}
		Builtin::TableIterSlot => {
			let handle = arg(&args, 0)?.handle()?;
			let slot = with_object!(ctx, handle, TableIter, iter => iter.slot()?);
			Ok(RtValue::Slot(slot))
		}
		Builtin::InserterInit => {
			let ObjectSpec::Inserter(spec) = spec(ctx, arg(&args, 0)?.index()?)? else {
				return Err(error!(internal::internal("object spec is not an inserter")));
			};
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::Inserter(Inserter::new(spec)))))
		}
		Builtin::RowAcquire => {
			let handle = arg(&args, 0)?.handle()?;
			let row = with_object!(ctx, handle, Inserter, ins => ins.acquire_row());
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::WriteRow(row))))
		}
		Builtin::RowSet => {
			let handle = arg(&args, 0)?.handle()?;
			let col = arg(&args, 1)?.index()?;
			let value = arg(&args, 2)?.value()?.clone();
			with_object!(ctx, handle, WriteRow, row => row.set(col, value)?);
			Ok(RtValue::Nothing)
		}
		Builtin::RowGet => {
			let handle = arg(&args, 0)?.handle()?;
			let col = arg(&args, 1)?.index()?;
			let value = with_object!(ctx, handle, WriteRow, row => row.get(col)?);
			Ok(RtValue::Value(value))
		}
		Builtin::RowCheckNotNull => {
			let inserter = arg(&args, 0)?.handle()?;
			let row = arg(&args, 1)?.handle()?;
			let (table, columns): (String, Vec<(usize, String)>) = with_object!(ctx, inserter, Inserter, ins => {
				(
					ins.table_name().to_string(),
					ins.not_null().iter().map(|&c| (c, ins.column_name(c).to_string())).collect(),
				)
			});
			for (col, name) in columns {
				let undefined = with_object!(ctx, row, WriteRow, r => r.get(col)?).is_undefined();
				if undefined {
					ctx.txn.mark_must_abort();
					return Err(error!(constraint::not_null_violation(&table, &name)));
				}
			}
			Ok(RtValue::Nothing)
		}
		Builtin::TableInsert => {
			let inserter = arg(&args, 0)?.handle()?;
			let row = arg(&args, 1)?.handle()?;
			let row_cell = ctx.arena.get(row)?;
			let row_guard = row_cell.lock();
			let RuntimeObject::WriteRow(write_row) = &*row_guard else {
				return Err(error!(internal::internal("expected write row")));
			};
			let slot = with_object!(ctx, inserter, Inserter, ins => ins.insert(ctx.txn.storage(), write_row)?);
			Ok(RtValue::Slot(slot))
		}
		Builtin::TableUpdate => {
			let inserter = arg(&args, 0)?.handle()?;
			let slot = arg(&args, 1)?.slot()?;
			let row = arg(&args, 2)?.handle()?;
			let row_cell = ctx.arena.get(row)?;
			let row_guard = row_cell.lock();
			let RuntimeObject::WriteRow(write_row) = &*row_guard else {
				return Err(error!(internal::internal("expected write row")));
			};
			with_object!(ctx, inserter, Inserter, ins => ins.update(ctx.txn.storage(), slot, write_row)?);
			Ok(RtValue::Nothing)
		}
		Builtin::TableDelete => {
			let inserter = arg(&args, 0)?.handle()?;
			let slot = arg(&args, 1)?.slot()?;
			let deleted = with_object!(ctx, inserter, Inserter, ins => ins.delete(ctx.txn.storage(), slot)?);
			Ok(RtValue::Value(Value::bool(deleted)))
		}
		Builtin::IndexInsert | Builtin::IndexDelete => {
			let inserter = arg(&args, 0)?.handle()?;
			let ordinal = arg(&args, 1)?.index()?;
			let row = arg(&args, 2)?.handle()?;
			let slot = arg(&args, 3)?.slot()?;
			let row_cell = ctx.arena.get(row)?;
			let row_guard = row_cell.lock();
			let RuntimeObject::WriteRow(write_row) = &*row_guard else {
				return Err(error!(internal::internal("expected write row")));
			};
			let ok = with_object!(ctx, inserter, Inserter, ins => if builtin == Builtin::IndexInsert {
				ins.index_insert(ctx.txn.storage(), ordinal, write_row, slot)?
			} else {
				ins.index_delete(ctx.txn.storage(), ordinal, write_row, slot)?
			});
			Ok(RtValue::Value(Value::bool(ok)))
		}
		Builtin::AbortUniqueViolation => {
			let inserter = arg(&args, 0)?.handle()?;
			let ordinal = arg(&args, 1)?.index()?;
			let (table, index) = with_object!(ctx, inserter, Inserter, ins => {
				(ins.table_name().to_string(), ins.index_name(ordinal).to_string())
			});
			ctx.txn.mark_must_abort();
			Err(error!(constraint::unique_violation(&table, &index)))
		}
		Builtin::AggInit => {
			let ObjectSpec::Agg(spec) = spec(ctx, arg(&args, 0)?.index()?)? else {
				return Err(error!(internal::internal("object spec is not an aggregation")));
			};
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::AggTable(AggTable::new(spec)))))
		}
		Builtin::AggUpdate => {
			let handle = arg(&args, 0)?.handle()?;
			let mut values = Vec::with_capacity(args.len().saturating_sub(1));
			for a in &args[1..] {
				values.push(a.value()?.clone());
			}
			with_object!(ctx, handle, AggTable, table => {
				let keys = values.drain(..table.key_count()).collect();
				table.update(keys, values)?
			});
			Ok(RtValue::Nothing)
		}
		Builtin::AggMerge => {
			let dst = arg(&args, 0)?.handle()?;
			let src = arg(&args, 1)?.handle()?;
			let RuntimeObject::AggTable(src_table) = ctx.arena.take(src)? else {
				return Err(error!(internal::internal("expected aggregation table")));
			};
			with_object!(ctx, dst, AggTable, table => table.merge(src_table)?);
			Ok(RtValue::Nothing)
		}
		Builtin::AggIterInit => {
			let handle = arg(&args, 0)?.handle()?;
			let rows = with_object!(ctx, handle, AggTable, table => table.rows()?);
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::RowIter(RowIter::new(rows)))))
		}
		Builtin::JoinInit => {
			let ObjectSpec::Join(spec) = spec(ctx, arg(&args, 0)?.index()?)? else {
				return Err(error!(internal::internal("object spec is not a join")));
			};
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::JoinTable(JoinTable::new(spec)))))
		}
		Builtin::JoinInsert => {
			let handle = arg(&args, 0)?.handle()?;
			let mut values = Vec::with_capacity(args.len().saturating_sub(1));
			for a in &args[1..] {
				values.push(a.value()?.clone());
			}
			with_object!(ctx, handle, JoinTable, table => {
				let keys = values.drain(..table.key_count()).collect();
				table.insert(keys, values)
			});
			Ok(RtValue::Nothing)
		}
		Builtin::JoinMerge => {
			let dst = arg(&args, 0)?.handle()?;
			let src = arg(&args, 1)?.handle()?;
			let RuntimeObject::JoinTable(src_table) = ctx.arena.take(src)? else {
				return Err(error!(internal::internal("expected join table")));
			};
			with_object!(ctx, dst, JoinTable, table => table.merge(src_table));
			Ok(RtValue::Nothing)
		}
		Builtin::JoinProbe => {
			let handle = arg(&args, 0)?.handle()?;
			let mut keys = Vec::with_capacity(args.len().saturating_sub(1));
			for a in &args[1..] {
				keys.push(a.value()?.clone());
			}
			let rows = with_object!(ctx, handle, JoinTable, table => table.probe(&keys));
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::RowIter(RowIter::new(rows)))))
		}
		Builtin::SorterInit => {
			let ObjectSpec::Sorter(spec) = spec(ctx, arg(&args, 0)?.index()?)? else {
				return Err(error!(internal::internal("object spec is not a sorter")));
			};
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::Sorter(Sorter::new(spec)))))
		}
		Builtin::SorterInsert => {
			let handle = arg(&args, 0)?.handle()?;
			let mut row = Vec::with_capacity(args.len().saturating_sub(1));
			for a in &args[1..] {
				row.push(a.value()?.clone());
			}
			with_object!(ctx, handle, Sorter, sorter => sorter.insert(row));
			Ok(RtValue::Nothing)
		}
		Builtin::SorterMerge => {
			let dst = arg(&args, 0)?.handle()?;
			let src = arg(&args, 1)?.handle()?;
			let RuntimeObject::Sorter(src_sorter) = ctx.arena.take(src)? else {
				return Err(error!(internal::internal("expected sorter")));
			};
			with_object!(ctx, dst, Sorter, sorter => sorter.merge(src_sorter));
			Ok(RtValue::Nothing)
		}
		Builtin::SorterSort => {
			let handle = arg(&args, 0)?.handle()?;
			with_object!(ctx, handle, Sorter, sorter => sorter.sort());
			Ok(RtValue::Nothing)
		}
		Builtin::SorterIterInit => {
			let handle = arg(&args, 0)?.handle()?;
			let rows = with_object!(ctx, handle, Sorter, sorter => sorter.rows());
			Ok(RtValue::Handle(ctx.arena.alloc(RuntimeObject::RowIter(RowIter::new(rows)))))
		}
		Builtin::RowIterAdvance => {
			let handle = arg(&args, 0)?.handle()?;
			let more = with_object!(ctx, handle, RowIter, iter => iter.advance());
			Ok(RtValue::Value(Value::bool(more)))
		}
		Builtin::RowIterColumn => {
			let handle = arg(&args, 0)?.handle()?;
			let col = arg(&args, 1)?.index()?;
			let value = with_object!(ctx, handle, RowIter, iter => iter.column(col)?);
			Ok(RtValue::Value(value))
		}
		Builtin::ResultEmit => {
			let mut row = Vec::with_capacity(args.len());
			for a in &args {
				row.push(a.value()?.clone());
			}
			ctx.output.emit(row);
			Ok(RtValue::Nothing)
		}
		Builtin::RowsAffectedAdd => {
			let n = arg(&args, 0)?.value()?.as_i64().unwrap_or(0);
			ctx.txn.add_rows_affected(n.max(0) as u64);
			Ok(RtValue::Nothing)
		}
		Builtin::FeatureRecord => {
			let translator = TranslatorId(arg(&args, 0)?.index()?);
			let counter = match arg(&args, 1)?.index()? {
				0 => FeatureCounter::NumRows,
				_ => FeatureCounter::Cardinality,
			};
			let value = arg(&args, 2)?.value()?.as_i64().unwrap_or(0);
			ctx.features.record(FeatureRecord {
				translator,
				counter,
				value,
			});
			Ok(RtValue::Nothing)
		}
		Builtin::ObjectCount => {
			let handle = arg(&args, 0)?.handle()?;
			let cell = ctx.arena.get(handle)?;
			let guard = cell.lock();
			let count = match &*guard {
				RuntimeObject::AggTable(t) => t.group_count(),
				RuntimeObject::JoinTable(t) => t.row_count(),
				RuntimeObject::Sorter(s) => s.row_count(),
				_ => 0,
			};
			Ok(RtValue::Value(Value::int8(count as i64)))
		}
		Builtin::HandleFree => {
			let handle = arg(&args, 0)?.handle()?;
			ctx.arena.free(handle);
			Ok(RtValue::Nothing)
		}
	}
}
