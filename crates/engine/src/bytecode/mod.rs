// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

//! The compiled backend.
//!
//! Lowers the structured IR into flat bytecode for a stack machine,
//! then executes it with a dispatch loop ([`vm`]). Lowering happens on
//! a background thread in interleaved mode, so it must never touch the
//! transaction or storage.

mod display;
mod lower;
mod opcode;
mod program;
mod vm;

pub use display::disassemble;
pub use lower::lower;
pub use opcode::Opcode;
pub use program::{CompiledFunc, CompiledProgram};
pub use vm::BytecodeVm;
