//! An insertion-ordered, deduplicating set of dependencies used during one template execution
//! (spec §2 component 4).
//!
//! A `{{range}}`-style template can reference the same dependency more than once per render pass
//! (e.g. two calls to `key "x"` in different branches); `DepSet` keeps the first-seen order so
//! that diagnostics and `Complete` checks are stable across runs even though a `HashMap`-backed
//! `Tracker` has no ordering of its own.

use std::collections::HashSet;

use crate::dependency::Dependency;

/// Tracks the distinct dependencies a single [`crate::template::Template::execute`] call touches,
/// preserving first-seen order.
#[derive(Debug, Default)]
pub struct DepSet {
	order: Vec<Dependency>,
	seen: HashSet<String>,
}
impl DepSet {
	/// Build an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Record a use of `dependency`. Returns whether this is the first time it was seen in this
	/// set (by ID, not by value).
	pub fn add(&mut self, dependency: Dependency) -> bool {
		if self.seen.insert(dependency.id()) {
			self.order.push(dependency);
			true
		} else {
			false
		}
	}

	/// Dependencies in first-seen order.
	pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
		self.order.iter()
	}

	/// IDs in first-seen order.
	pub fn ids(&self) -> impl Iterator<Item = String> + '_ {
		self.order.iter().map(Dependency::id)
	}

	/// Number of distinct dependencies recorded.
	pub fn len(&self) -> usize {
		self.order.len()
	}

	/// Whether no dependency has been recorded yet.
	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dependency::{Dependency, testing::FakeQuery};

	#[test]
	fn repeated_dependency_is_recorded_once_in_first_seen_order() {
		let mut set = DepSet::new();

		assert!(set.add(Dependency::Fake(FakeQuery::new("a"))));
		assert!(set.add(Dependency::Fake(FakeQuery::new("b"))));
		assert!(!set.add(Dependency::Fake(FakeQuery::new("a"))), "re-adding the same ID is a no-op");

		assert_eq!(set.len(), 2);
		assert_eq!(set.ids().collect::<Vec<_>>(), vec!["fake(a)".to_owned(), "fake(b)".to_owned()]);
	}
}
