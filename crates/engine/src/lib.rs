// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Query compilation pipeline and dual execution backends.
//!
//! A physical plan is translated, pipeline by pipeline, into a typed
//! intermediate representation ([`ir`]). The IR is either walked
//! directly by the tree interpreter ([`interpret`]) or lowered to a
//! flat bytecode program executed by a dispatch loop ([`bytecode`]).
//! Both backends call into one runtime builtin library ([`runtime`]),
//! so they share a single semantic definition.

#![cfg_attr(not(debug_assertions), deny(warnings))]

pub use smelt_type::Result;

pub mod bytecode;
pub mod exec;
pub mod explain;
pub mod feature;
pub mod interpret;
pub mod ir;
pub mod pipeline;
pub mod plan;
pub mod runtime;
pub mod settings;
pub mod test_utils;
pub mod translate;

pub use exec::{ExecutableQuery, ExecutionContext, ExecutionMode};
pub use settings::EngineSettings;
pub use translate::compile;
