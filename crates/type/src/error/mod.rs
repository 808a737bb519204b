// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::fmt::{Display, Formatter};

pub mod diagnostic;

use diagnostic::Diagnostic;

/// The single error type of the workspace, carrying a [`Diagnostic`].
#[derive(Debug, Clone, PartialEq)]
pub struct Error(pub Diagnostic);

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub fn diagnostic(&self) -> &Diagnostic {
		&self.0
	}

	pub fn into_diagnostic(self) -> Diagnostic {
		self.0
	}

	/// Stable machine-readable code, e.g. `CONSTRAINT_001`.
	pub fn code(&self) -> &str {
		&self.0.code
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.0.code, self.0.message)?;
		if let Some(origin) = &self.0.origin {
			write!(f, " ({})", origin)?;
		}
		Ok(())
	}
}

impl std::error::Error for Error {}

/// Wrap a [`Diagnostic`] into an [`Error`], stamping the file/line the
/// condition was raised from.
#[macro_export]
macro_rules! error {
	($diag:expr) => {
		$crate::error::Error($diag.with_origin(concat!(file!(), ":", line!())))
	};
}

/// Return early with an [`Error`] built from a [`Diagnostic`].
#[macro_export]
macro_rules! return_error {
	($diag:expr) => {
		return Err($crate::error!($diag))
	};
}
