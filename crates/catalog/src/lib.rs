// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Schema metadata and the catalog accessor.
//!
//! The catalog is an external collaborator from the engine's point of
//! view: compilation reads table and index definitions through
//! [`Catalog`] as synchronous, side-effect-free lookups.

mod catalog;
mod index;
mod table;

pub use catalog::Catalog;
pub use index::IndexDef;
pub use table::{ColumnDef, TableDef};
