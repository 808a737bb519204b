// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use crate::{Type, error::diagnostic::Diagnostic};

/// Integer arithmetic overflowed the value's declared type.
pub fn integer_overflow(ty: Type, operation: &str) -> Diagnostic {
	Diagnostic {
		code: "RUNTIME_001".to_string(),
		message: format!("{} overflow in {} arithmetic", operation, ty),
		label: Some(format!("result does not fit into {}", ty)),
		help: Some("cast the operands to a wider integer type".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// Division or remainder by zero.
pub fn division_by_zero(ty: Type) -> Diagnostic {
	Diagnostic {
		code: "RUNTIME_002".to_string(),
		message: format!("division by zero in {} arithmetic", ty),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// An operand had a type the operation does not accept. This surfaces a
/// binder contract breach at runtime and is kept distinct from the
/// internal-error diagnostics because a cast can legitimately produce it.
pub fn type_mismatch(expected: &str, got: Type) -> Diagnostic {
	Diagnostic {
		code: "RUNTIME_003".to_string(),
		message: format!("expected {} but got {}", expected, got),
		label: None,
		help: None,
		notes: vec![],
		origin: None,
		cause: None,
	}
}

/// A value could not be converted to the requested type.
pub fn conversion_failed(value: &str, target: Type) -> Diagnostic {
	Diagnostic {
		code: "RUNTIME_004".to_string(),
		message: format!("cannot convert '{}' to {}", value, target),
		label: None,
		help: Some("ensure the source value is representable in the target type".to_string()),
		notes: vec![],
		origin: None,
		cause: None,
	}
}
