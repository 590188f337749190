//! Test-only dependency kind with a scripted response sequence.
//!
//! Exposed unconditionally (not `#[cfg(test)]`) so that integration tests under `tests/` — a
//! separate compilation unit from the library — can depend on it, mirroring how the teacher
//! crate exposes `CacheManager::with_client` for its own integration tests.

use std::{collections::VecDeque, sync::Mutex};

use crate::{_prelude::*, dependency::clients::Looker, dependency::metadata::Metadata, value::Value};

/// One scripted step of a [`FakeQuery`]'s response sequence.
#[derive(Clone, Debug)]
enum Step {
	Value(Value, Metadata),
	Error(String),
}

/// A dependency whose responses are scripted ahead of time rather than fetched from a real
/// upstream. Used by unit and integration tests to exercise the view/tracker/watcher/resolver
/// subsystem deterministically (spec §8 scenarios S1-S6).
#[derive(Clone, Debug)]
pub struct FakeQuery {
	id: String,
	steps: Arc<Mutex<VecDeque<Step>>>,
	last_served: Arc<Mutex<Option<Step>>>,
}
impl FakeQuery {
	/// Create a fake dependency identified by `id` with an empty script; the first fetch blocks
	/// until a step is queued via [`FakeQuery::push_value`] or [`FakeQuery::push_error`], which
	/// in this in-process test double simply means the fetch returns `Value::Null` with index 0
	/// until something is queued — callers queue steps before calling into the watcher.
	pub fn new(id: impl Into<String>) -> Self {
		Self { id: id.into(), steps: Arc::new(Mutex::new(VecDeque::new())), last_served: Arc::new(Mutex::new(None)) }
	}

	/// Queue a successful response.
	pub fn push_value(&self, value: Value, last_index: u64) {
		self.steps
			.lock()
			.expect("fake dependency lock poisoned")
			.push_back(Step::Value(value, Metadata::fresh(last_index)));
	}

	/// Queue a successful response reporting the given staleness (spec §8 scenario S4), used to
	/// exercise the view's `allow_stale`/`max_stale` downgrade path.
	pub fn push_stale_value(&self, value: Value, last_index: u64, last_contact: Duration) {
		self.steps
			.lock()
			.expect("fake dependency lock poisoned")
			.push_back(Step::Value(value, Metadata { last_index, last_contact }));
	}

	/// Queue a failure response carrying the given message.
	pub fn push_error(&self, message: impl Into<String>) {
		self.steps.lock().expect("fake dependency lock poisoned").push_back(Step::Error(message.into()));
	}

	/// Queue a response equivalent to a "connection refused" failure, which the view treats
	/// specially by resetting its last-seen index (spec §4.1).
	pub fn push_connection_refused(&self) {
		self.push_error("connection refused");
	}

	/// Dependency ID.
	pub fn id(&self) -> String {
		format!("fake({})", self.id)
	}

	pub(crate) async fn fetch(&self) -> Result<(Value, Metadata)> {
		let step = {
			let mut steps = self.steps.lock().expect("fake dependency lock poisoned");
			steps.pop_front()
		};
		let step = match step {
			Some(step) => {
				*self.last_served.lock().expect("fake dependency lock poisoned") = Some(step.clone());
				step
			},
			None => match self.last_served.lock().expect("fake dependency lock poisoned").clone() {
				Some(step) => step,
				None => Step::Value(Value::Null, Metadata::fresh(0)),
			},
		};

		match step {
			Step::Value(value, metadata) => Ok((value, metadata)),
			Step::Error(message) => Err(Error::Upstream { id: self.id(), reason: message }),
		}
	}
}

/// A trivial [`Looker`] for tests that never exercise [`FakeQuery`]'s catalog/secrets paths.
#[derive(Clone, Debug, Default)]
pub struct NullLooker;
impl Looker for NullLooker {
	fn catalog(&self) -> &crate::dependency::clients::CatalogClient {
		unimplemented!("NullLooker has no catalog client; use FakeQuery dependencies in tests")
	}

	fn secrets(&self) -> &crate::dependency::clients::SecretsClient {
		unimplemented!("NullLooker has no secrets client; use FakeQuery dependencies in tests")
	}

	fn stop(&self) {}
}
