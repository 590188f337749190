//! The dependency cache (spec §3, §4.2): a process-local map from dependency ID to last-known
//! value.

use std::{collections::HashMap, sync::RwLock};

use crate::{_prelude::*, value::Value};

/// Thread-safe mapping from dependency ID to its last-known [`Value`].
///
/// The only nontrivial rule: [`Cache::save`] refuses to create a new entry whose value is
/// semantically empty, so that [`Cache::recall`] can distinguish "this dependency has never
/// delivered data" (absent) from "this dependency delivered an empty value" (present, empty).
/// Once a key exists, subsequent writes always overwrite regardless of emptiness.
#[derive(Debug, Default)]
pub struct Cache {
	entries: RwLock<HashMap<String, Value>>,
}
impl Cache {
	/// Construct an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Write a value for `id`. A first-ever write of a semantically empty value is dropped
	/// (spec §4.2, §8 property 7); any write to an already-present key overwrites unconditionally.
	pub fn save(&self, id: &str, value: Value) {
		let mut entries = self.entries.write().expect("cache lock poisoned");

		if !entries.contains_key(id) && value.is_empty() {
			return;
		}

		entries.insert(id.to_owned(), value);
	}

	/// Look up the last-known value for `id`.
	pub fn recall(&self, id: &str) -> Option<Value> {
		let entries = self.entries.read().expect("cache lock poisoned");

		entries.get(id).cloned()
	}

	/// Remove the entry for `id`, if present.
	pub fn delete(&self, id: &str) {
		let mut entries = self.entries.write().expect("cache lock poisoned");

		entries.remove(id);
	}

	/// Clear every entry. Used on [`crate::Watcher::stop`].
	pub fn reset(&self) {
		let mut entries = self.entries.write().expect("cache lock poisoned");

		entries.clear();
	}

	/// Number of entries currently cached; mainly useful for diagnostics and tests.
	pub fn len(&self) -> usize {
		self.entries.read().expect("cache lock poisoned").len()
	}

	/// Whether the cache currently holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_insert_of_empty_value_is_skipped() {
		let cache = Cache::new();

		cache.save("a", Value::Null);
		assert!(cache.recall("a").is_none());

		cache.save("a", Value::String("x".into()));
		assert_eq!(cache.recall("a"), Some(Value::String("x".into())));

		cache.save("a", Value::Null);
		assert_eq!(cache.recall("a"), Some(Value::Null), "overwrite of existing key always applies");
	}

	#[test]
	fn reset_clears_every_entry() {
		let cache = Cache::new();

		cache.save("a", Value::String("x".into()));
		cache.save("b", Value::String("y".into()));
		assert_eq!(cache.len(), 2);

		cache.reset();
		assert!(cache.is_empty());
	}

	#[test]
	fn delete_removes_a_single_entry() {
		let cache = Cache::new();

		cache.save("a", Value::String("x".into()));
		cache.save("b", Value::String("y".into()));
		cache.delete("a");

		assert!(cache.recall("a").is_none());
		assert!(cache.recall("b").is_some());
	}
}
