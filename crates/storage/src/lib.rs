// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! In-memory storage engine and transaction handle.
//!
//! This crate is the stand-in for the external storage collaborator:
//! a block-structured table heap plus BTree secondary indexes, exposed
//! exclusively through the [`smelt_core::StorageEngine`] ABI.

mod memory;
mod transaction;

pub use memory::MemoryStorage;
pub use transaction::StandardTransaction;
