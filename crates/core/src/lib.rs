// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! Binary row format, identifiers and the storage ABI.
//!
//! The engine never touches persistent state directly: every mutation
//! goes through the [`interface::StorageEngine`] trait, and every row
//! buffer it reads or writes is laid out by [`row::RowLayout`].

pub mod id;
pub mod interface;
pub mod key;
pub mod row;

pub use id::{IndexId, RowSlot, TableId};
pub use interface::{StorageEngine, Transaction};
pub use key::{EncodedKey, encode_key};
pub use row::{Row, RowLayout};
