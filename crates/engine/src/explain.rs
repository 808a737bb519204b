// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Explain output for compiled queries.
//!
//! The summary lists pipelines in execution order, each with its
//! parallelism, dependencies and operator chain from source to
//! consumer. The summary is machine-parseable: [`parse_summary`] reads
//! it back, which the shell uses to diff plans across versions.

use smelt_type::{Result, diagnostic::execution, error};

use crate::{
	bytecode::{disassemble, lower},
	exec::ExecutableQuery,
	pipeline::execution_order,
};

/// One parsed summary line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineSummary {
	pub id: usize,
	pub serial: bool,
	pub depends_on: Vec<usize>,
	/// Operator names, source first.
	pub operators: Vec<String>,
}

/// Pipeline summary, one line per pipeline in execution order.
pub fn explain(query: &ExecutableQuery) -> String {
	let names = query.translator_names();
	let mut out = String::new();
	for pid in execution_order(query.pipelines()) {
		let pipeline = &query.pipelines()[pid.0];
		let mode = if pipeline.is_parallel() {
			"parallel"
		} else {
			"serial"
		};
		let deps: Vec<String> = pipeline.depends_on.iter().map(|d| d.to_string()).collect();
		// translators are stored consumer first; print source first
		let chain: Vec<&str> =
			pipeline.translators.iter().rev().map(|t| names.get(t.0).map(String::as_str).unwrap_or("?")).collect();
		out.push_str(&format!(
			"pipeline {} [{}] deps=[{}]: {}\n",
			pipeline.id,
			mode,
			deps.join(", "),
			chain.join(" -> ")
		));
	}
	out
}

/// Summary plus the full generated module.
pub fn explain_ir(query: &ExecutableQuery) -> String {
	format!("{}\n{}", explain(query).trim_end(), query.module())
}

/// Summary plus the disassembled bytecode. Lowers the module, so this
/// reports the same errors `ExecutionMode::Compiled` would.
pub fn explain_bytecode(query: &ExecutableQuery) -> Result<String> {
	let program = lower(query.module())?;
	Ok(format!("{}\n{}", explain(query).trim_end(), disassemble(&program)))
}

/// Parse a summary produced by [`explain`].
pub fn parse_summary(text: &str) -> Result<Vec<PipelineSummary>> {
	let mut out = Vec::new();
	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		out.push(parse_line(line)?);
	}
	Ok(out)
}

fn parse_line(line: &str) -> Result<PipelineSummary> {
	let rest = line
		.strip_prefix("pipeline ")
		.ok_or_else(|| error!(execution::malformed_explain(format!("line does not start with 'pipeline': {line}"))))?;
	let (head, chain) = rest
		.split_once(": ")
		.ok_or_else(|| error!(execution::malformed_explain(format!("missing operator chain: {line}"))))?;

	let mut parts = head.split_whitespace();
	let id = parts
		.next()
		.and_then(|p| p.strip_prefix('p'))
		.and_then(|p| p.parse::<usize>().ok())
		.ok_or_else(|| error!(execution::malformed_explain(format!("bad pipeline id: {line}"))))?;
	let serial = match parts.next() {
		Some("[serial]") => true,
		Some("[parallel]") => false,
		_ => return Err(error!(execution::malformed_explain(format!("bad parallelism marker: {line}")))),
	};
	let deps = parts
		.next()
		.and_then(|p| p.strip_prefix("deps=["))
		.and_then(|p| p.strip_suffix(']'))
		.ok_or_else(|| error!(execution::malformed_explain(format!("bad dependency list: {line}"))))?;
	let mut depends_on = Vec::new();
	for dep in deps.split(',').map(str::trim).filter(|d| !d.is_empty()) {
		let dep = dep
			.strip_prefix('p')
			.and_then(|d| d.parse::<usize>().ok())
			.ok_or_else(|| error!(execution::malformed_explain(format!("bad dependency '{dep}': {line}"))))?;
		depends_on.push(dep);
	}

	let operators: Vec<String> = chain.split(" -> ").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
	if operators.is_empty() {
		return Err(error!(execution::malformed_explain(format!("empty operator chain: {line}"))));
	}
	Ok(PipelineSummary {
		id,
		serial,
		depends_on,
		operators,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_summary_line() {
		let parsed = parse_summary("pipeline p0 [serial] deps=[p1, p2]: TableScan -> Filter -> Output\n").unwrap();
		assert_eq!(
			parsed,
			vec![PipelineSummary {
				id: 0,
				serial: true,
				depends_on: vec![1, 2],
				operators: vec!["TableScan".to_string(), "Filter".to_string(), "Output".to_string()],
			}]
		);
	}

	#[test]
	fn test_parse_empty_deps() {
		let parsed = parse_summary("pipeline p1 [parallel] deps=[]: TableScan -> Aggregate").unwrap();
		assert_eq!(parsed[0].depends_on, Vec::<usize>::new());
		assert!(!parsed[0].serial);
	}

	#[test]
	fn test_parse_rejects_garbage() {
		assert_eq!(parse_summary("not a summary").unwrap_err().code(), "EXEC_002");
		assert_eq!(parse_summary("pipeline x [serial] deps=[]: A").unwrap_err().code(), "EXEC_002");
		assert_eq!(parse_summary("pipeline p0 [sometimes] deps=[]: A").unwrap_err().code(), "EXEC_002");
	}
}
