// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Pipelines and their state layout.
//!
//! A pipeline is a maximal chain of operators that pass single rows
//! without materialization. Pipeline-breaking operators (sort, the
//! build side of a hash join, aggregation) end one pipeline and source
//! the next; the dependency edges between pipelines drive execution
//! order.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use smelt_core::TableId;
use smelt_type::Type;

use crate::{ir::FuncId, translate::TranslatorId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineId(pub usize);

impl Display for PipelineId {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "p{}", self.0)
	}
}

/// What a state slot holds at runtime. Used for dumps and for zeroing
/// the arena, not enforced per access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotType {
	Scalar(Type),
	Handle,
	RowSlot,
}

#[derive(Clone, Debug)]
pub struct StateSlot {
	pub name: String,
	pub ty: SlotType,
	/// Translator that declared the slot.
	pub owner: TranslatorId,
}

/// Index of a slot in a pipeline's per-worker state arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSlot(pub usize);

/// Index of a slot in the query-wide state arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuerySlot(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
	Serial,
	Parallel,
}

/// A compiled pipeline: its operator chain (consumer first, source
/// last, the order translators were prepared in), state slot layout and
/// the generated function for each phase.
#[derive(Clone, Debug)]
pub struct Pipeline {
	pub id: PipelineId,
	pub translators: Vec<TranslatorId>,
	pub slots: Vec<StateSlot>,
	pub parallelism: Parallelism,
	/// Table driving the source loop, if the source is a scan. The
	/// driver partitions this table's blocks across workers.
	pub source_table: Option<TableId>,
	/// Pipelines that must complete before this one starts.
	pub depends_on: Vec<PipelineId>,
	pub init_fn: Option<FuncId>,
	pub work_fn: Option<FuncId>,
	pub merge_fn: Option<FuncId>,
	pub teardown_fn: Option<FuncId>,
}

impl Pipeline {
	pub fn new(id: PipelineId) -> Self {
		Self {
			id,
			translators: Vec::new(),
			slots: Vec::new(),
			parallelism: Parallelism::Parallel,
			source_table: None,
			depends_on: Vec::new(),
			init_fn: None,
			work_fn: None,
			merge_fn: None,
			teardown_fn: None,
		}
	}

	pub fn declare_slot(&mut self, name: impl Into<String>, ty: SlotType, owner: TranslatorId) -> PipelineSlot {
		self.slots.push(StateSlot {
			name: name.into(),
			ty,
			owner,
		});
		PipelineSlot(self.slots.len() - 1)
	}

	/// Operators may only weaken parallelism, never restore it.
	pub fn force_serial(&mut self) {
		self.parallelism = Parallelism::Serial;
	}

	pub fn is_parallel(&self) -> bool {
		self.parallelism == Parallelism::Parallel
	}
}

/// Pipelines in dependency order: every pipeline runs after everything
/// it depends on. Ties keep creation order so execution stays
/// deterministic.
pub fn execution_order(pipelines: &[Pipeline]) -> Vec<PipelineId> {
	let mut order = Vec::with_capacity(pipelines.len());
	let mut done = vec![false; pipelines.len()];
	// dependency graphs here are tiny and acyclic by construction
	while order.len() < pipelines.len() {
		for p in pipelines {
			if done[p.id.0] {
				continue;
			}
			if p.depends_on.iter().all(|d| done[d.0]) {
				done[p.id.0] = true;
				order.push(p.id);
			}
		}
	}
	order
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pipeline(id: usize, deps: &[usize]) -> Pipeline {
		let mut p = Pipeline::new(PipelineId(id));
		p.depends_on = deps.iter().map(|d| PipelineId(*d)).collect();
		p
	}

	#[test]
	fn test_execution_order_respects_dependencies() {
		// p0 (root) depends on p1, p1 depends on p2
		let pipelines = vec![pipeline(0, &[1]), pipeline(1, &[2]), pipeline(2, &[])];
		let order = execution_order(&pipelines);
		assert_eq!(order, vec![PipelineId(2), PipelineId(1), PipelineId(0)]);
	}

	#[test]
	fn test_execution_order_keeps_creation_order_for_peers() {
		let pipelines = vec![pipeline(0, &[1, 2]), pipeline(1, &[]), pipeline(2, &[])];
		let order = execution_order(&pipelines);
		assert_eq!(order, vec![PipelineId(1), PipelineId(2), PipelineId(0)]);
	}

	#[test]
	fn test_force_serial_is_sticky() {
		let mut p = Pipeline::new(PipelineId(0));
		assert!(p.is_parallel());
		p.force_serial();
		assert!(!p.is_parallel());
	}
}
