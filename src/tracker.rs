//! The tracker: a many-to-many mapping between notifiers and views, with usage marks for
//! mark/sweep orphan collection (spec §4.4 referenced from §3, §8 property 3 and 6).

use std::collections::HashMap;

use crate::_prelude::*;

/// Something that can be woken when a tracked dependency changes.
///
/// A [`crate::template::Template`] is the canonical implementation; tests may supply simpler
/// stand-ins.
pub trait Notifier: Send + Sync + std::fmt::Debug {
	/// Stable, unique-per-registration identifier.
	fn id(&self) -> String;

	/// Offered the new value for one of this notifier's tracked dependencies. Returns whether the
	/// notifier wants to be re-rendered.
	fn notify(&self, value: &Value) -> bool;
}

/// One `{view, notifier}` relationship (spec §3 data model).
#[derive(Clone, Debug)]
pub struct TrackedPair {
	/// The dependency/view ID.
	pub view_id: String,
	/// The notifier ID.
	pub notifier_id: String,
	/// True while the owning notifier is "live" (not mid mark/sweep collection).
	pub in_use: bool,
	/// True once the cached value for `view_id` was actually read by the notifier.
	pub cache_accessed: bool,
}

#[derive(Default)]
struct State {
	notifiers: HashMap<String, Arc<dyn Notifier>>,
	pairs: HashMap<(String, String), TrackedPair>,
}

/// Owns the notifier registry and the tracked-pair table.
///
/// All mutation goes through a single internal mutex (spec §5: "fine-grained locks on the view
/// and tracker", here collapsed to one lock since the table itself is small and short-held).
#[derive(Debug, Default)]
pub struct Tracker {
	state: std::sync::Mutex<State>,
}
impl Tracker {
	/// Build an empty tracker.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register one or more notifiers. Fails all-or-nothing on the first duplicate ID
	/// encountered, matching spec §3's "no partial effect" invariant.
	pub fn register(&self, notifiers: impl IntoIterator<Item = Arc<dyn Notifier>>) -> Result<()> {
		let notifiers: Vec<_> = notifiers.into_iter().collect();
		let mut state = self.lock();

		for notifier in &notifiers {
			if state.notifiers.contains_key(&notifier.id()) {
				return Err(Error::DuplicateNotifier(notifier.id()));
			}
		}

		for notifier in notifiers {
			state.notifiers.insert(notifier.id(), notifier);
		}

		Ok(())
	}

	/// Best-effort registration: skips notifiers already registered instead of erroring. Used by
	/// [`crate::Watcher::track`], which may be called repeatedly for the same notifier across
	/// render passes.
	pub fn ensure_registered(&self, notifier: Arc<dyn Notifier>) {
		let mut state = self.lock();

		state.notifiers.entry(notifier.id()).or_insert(notifier);
	}

	/// Record that `notifier_id` uses `view_id`, marking the pair `in_use`. Creates the pair if
	/// absent. Returns whether the pair was newly created.
	///
	/// # Panics
	///
	/// Panics if `notifier_id` was never registered via [`Tracker::register`]/
	/// [`Tracker::ensure_registered`] (spec §4.4, §7: "unregistered notifier used → programmer
	/// error; deliberate panic/fatal").
	pub fn add(&self, notifier_id: &str, view_id: &str) -> bool {
		let mut state = self.lock();

		assert!(state.notifiers.contains_key(notifier_id), "unregistered notifier used: {notifier_id}");

		let key = (notifier_id.to_owned(), view_id.to_owned());

		if let Some(pair) = state.pairs.get_mut(&key) {
			pair.in_use = true;
			false
		} else {
			state.pairs.insert(key, TrackedPair {
				view_id: view_id.to_owned(),
				notifier_id: notifier_id.to_owned(),
				in_use: true,
				cache_accessed: false,
			});
			true
		}
	}

	/// Mark that the cached value for `view_id` was actually read by `notifier_id`.
	pub fn cache_accessed(&self, notifier_id: &str, view_id: &str) {
		let mut state = self.lock();

		if let Some(pair) = state.pairs.get_mut(&(notifier_id.to_owned(), view_id.to_owned())) {
			pair.cache_accessed = true;
		}
	}

	/// Every view ID currently tracked (by any notifier, with `in_use` or not).
	pub fn views_for(&self, notifier_id: &str) -> Vec<String> {
		self.lock().pairs.values().filter(|pair| pair.notifier_id == notifier_id).map(|pair| pair.view_id.clone()).collect()
	}

	/// Every notifier tracking `view_id`, used to fan out a view update.
	pub fn notifiers_for(&self, view_id: &str) -> Vec<Arc<dyn Notifier>> {
		let state = self.lock();

		state
			.pairs
			.values()
			.filter(|pair| pair.view_id == view_id)
			.filter_map(|pair| state.notifiers.get(&pair.notifier_id).cloned())
			.collect()
	}

	/// `Complete(notifier)` per spec §4.4/§8 property 6: true iff every pair tracked for this
	/// notifier has had its cached value actually read this pass.
	pub fn complete(&self, notifier_id: &str) -> bool {
		let state = self.lock();
		let mut any = false;

		for pair in state.pairs.values().filter(|pair| pair.notifier_id == notifier_id) {
			any = true;

			if !pair.cache_accessed {
				return false;
			}
		}

		any
	}

	/// Clear `in_use`/`cache_accessed` for every pair belonging to `notifier_id`, ahead of a
	/// render pass (spec §4.4).
	pub fn mark(&self, notifier_id: &str) {
		let mut state = self.lock();

		for pair in state.pairs.values_mut().filter(|pair| pair.notifier_id == notifier_id) {
			pair.in_use = false;
			pair.cache_accessed = false;
		}
	}

	/// Drop pairs for `notifier_id` left `!in_use` after a render pass (dependencies no longer
	/// referenced), returning the view IDs that now have no remaining referrer at all (spec §8
	/// property 3: "views in R are stopped ... unless another notifier still references them").
	pub fn sweep(&self, notifier_id: &str) -> Vec<String> {
		let mut state = self.lock();

		let orphaned: Vec<String> = state
			.pairs
			.values()
			.filter(|pair| pair.notifier_id == notifier_id && !pair.in_use)
			.map(|pair| pair.view_id.clone())
			.collect();

		state.pairs.retain(|_, pair| !(pair.notifier_id == notifier_id && !pair.in_use));

		orphaned.into_iter().filter(|view_id| !state.pairs.values().any(|pair| &pair.view_id == view_id)).collect()
	}

	/// Drop every tracked pair and registered notifier.
	pub fn reset(&self) {
		let mut state = self.lock();

		state.pairs.clear();
		state.notifiers.clear();
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, State> {
		self.state.lock().expect("tracker lock poisoned")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug)]
	struct StubNotifier(&'static str);
	impl Notifier for StubNotifier {
		fn id(&self) -> String {
			self.0.to_owned()
		}

		fn notify(&self, _value: &Value) -> bool {
			true
		}
	}

	#[test]
	fn duplicate_registration_is_rejected_all_or_nothing() {
		let tracker = Tracker::new();

		tracker.register([Arc::new(StubNotifier("t1")) as Arc<dyn Notifier>]).unwrap();
		let err = tracker.register([Arc::new(StubNotifier("t1")) as Arc<dyn Notifier>]).unwrap_err();

		assert!(matches!(err, Error::DuplicateNotifier(id) if id == "t1"));
	}

	#[test]
	fn add_panics_for_an_unregistered_notifier() {
		let tracker = Tracker::new();

		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| tracker.add("ghost", "a")));

		assert!(result.is_err(), "an unregistered notifier must never silently succeed");
	}

	#[test]
	fn complete_requires_every_tracked_pair_to_be_read() {
		let tracker = Tracker::new();

		tracker.ensure_registered(Arc::new(StubNotifier("t1")));
		tracker.add("t1", "a");
		tracker.add("t1", "b");
		assert!(!tracker.complete("t1"), "nothing accessed yet");

		tracker.cache_accessed("t1", "a");
		assert!(!tracker.complete("t1"), "b still unread");

		tracker.cache_accessed("t1", "b");
		assert!(tracker.complete("t1"));
	}

	#[test]
	fn complete_is_false_when_the_notifier_has_no_pairs_yet() {
		let tracker = Tracker::new();

		assert!(!tracker.complete("unknown"));
	}

	#[test]
	fn sweep_drops_unreferenced_view_but_keeps_shared_one() {
		let tracker = Tracker::new();

		tracker.ensure_registered(Arc::new(StubNotifier("t1")));
		tracker.ensure_registered(Arc::new(StubNotifier("t2")));
		tracker.add("t1", "a");
		tracker.add("t1", "b");
		tracker.add("t2", "b");

		tracker.mark("t1");
		tracker.add("t1", "b");
		let orphaned = tracker.sweep("t1");

		assert_eq!(orphaned, vec!["a".to_owned()], "a has no remaining referrer");
		assert!(tracker.views_for("t2").contains(&"b".to_owned()), "t2's pair for b must survive");
	}
}
