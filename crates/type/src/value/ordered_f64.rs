// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 SmeltDB

use std::{
	cmp::Ordering,
	fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

/// An `f64` that is guaranteed not to be NaN, giving it total ordering
/// and a stable hash so floating point values can participate in group
/// and join keys.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedF64(f64);

impl OrderedF64 {
	pub fn value(&self) -> f64 {
		self.0
	}

	/// Zero, the identity for sums.
	pub fn zero() -> Self {
		OrderedF64(0.0)
	}
}

impl TryFrom<f64> for OrderedF64 {
	type Error = ();

	fn try_from(v: f64) -> Result<Self, Self::Error> {
		if v.is_nan() {
			Err(())
		} else {
			Ok(OrderedF64(v))
		}
	}
}

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for OrderedF64 {
	fn cmp(&self, other: &Self) -> Ordering {
		// NaN is excluded by construction, so this never falls back
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

impl std::hash::Hash for OrderedF64 {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		// Normalize -0.0 so it hashes like 0.0
		let v = if self.0 == 0.0 {
			0.0f64
		} else {
			self.0
		};
		v.to_bits().hash(state);
	}
}

impl Display for OrderedF64 {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_nan_rejected() {
		assert!(OrderedF64::try_from(f64::NAN).is_err());
	}

	#[test]
	fn test_total_order() {
		let a = OrderedF64::try_from(1.0).unwrap();
		let b = OrderedF64::try_from(2.0).unwrap();
		assert!(a < b);
	}

	#[test]
	fn test_negative_zero_hashes_like_zero() {
		use std::collections::hash_map::DefaultHasher;
		use std::hash::{Hash, Hasher};

		let hash = |v: OrderedF64| {
			let mut h = DefaultHasher::new();
			v.hash(&mut h);
			h.finish()
		};

		let pos = OrderedF64::try_from(0.0).unwrap();
		let neg = OrderedF64::try_from(-0.0).unwrap();
		assert_eq!(hash(pos), hash(neg));
	}
}
