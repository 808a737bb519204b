// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Scalar types, runtime values and diagnostics.
//!
//! This crate is the leaf of the workspace: the closed set of SQL scalar
//! types ([`Type`]), the typed nullable runtime value ([`Value`]) shared
//! by both execution backends, and the [`Diagnostic`]-carrying error
//! type used everywhere else.

pub mod error;
pub mod value;

pub use error::{Error, Result, diagnostic, diagnostic::Diagnostic};
pub use value::{GetType, OrderedF64, Type, Value};
