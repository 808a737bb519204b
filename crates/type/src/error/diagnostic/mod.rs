// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod compile;
pub mod constraint;
pub mod execution;
pub mod internal;
pub mod runtime;
pub mod transaction;

/// A structured description of an error condition, rich enough to
/// surface to a client: stable code, human message, optional hints and
/// the `file:line` the condition was raised from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
	pub code: String,
	pub message: String,
	pub label: Option<String>,
	pub help: Option<String>,
	pub notes: Vec<String>,
	/// `file:line` of the raise site, stamped by the `error!` macro.
	pub origin: Option<String>,
	pub cause: Option<Box<Diagnostic>>,
}

impl Diagnostic {
	pub fn with_origin(mut self, origin: &str) -> Self {
		if self.origin.is_none() {
			self.origin = Some(origin.to_string());
		}
		self
	}

	/// JSON rendering for clients consuming diagnostics over a wire
	/// protocol. Falls back to the bare code if serialization fails.
	pub fn to_json(&self) -> String {
		serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", self.code))
	}
}

impl Display for Diagnostic {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.code)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_diagnostic_json_round_trip() {
		let diagnostic = runtime::division_by_zero(crate::Type::Int8).with_origin("src/lib.rs:1");
		let json = diagnostic.to_json();
		assert!(json.contains("\"RUNTIME_002\""));
		let parsed: Diagnostic = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, diagnostic);
	}
}
