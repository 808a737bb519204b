// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use serde::{Deserialize, Serialize};

/// Engine knobs read at compile and run time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSettings {
	/// Worker count for parallel pipelines. `1` forces every pipeline
	/// serial regardless of what the plan allows.
	pub worker_count: usize,
	/// Rows buffered per output batch before the result callback fires.
	pub output_batch_size: usize,
	/// Whether translators record operating-unit features.
	pub record_features: bool,
}

impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			worker_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
			output_batch_size: 64,
			record_features: true,
		}
	}
}

impl EngineSettings {
	pub fn serial() -> Self {
		Self {
			worker_count: 1,
			..Self::default()
		}
	}
}
