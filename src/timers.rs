//! Per-template buffer (debounce) timers (spec §4.3).
//!
//! Each template may configure a `(min, max)` buffer period: once ticked, the timer won't fire
//! sooner than `min` after the *last* tick, but never later than `max` after the *first* tick.
//! Determinism for tests comes from `tokio::time`'s own virtual clock (`tokio::time::pause`/
//! `advance`, gated behind the `test-util` feature) rather than a hand-rolled clock
//! abstraction — the ecosystem already solves this the way the spec's "fake clock" note (§9)
//! asks for.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::_prelude::*;

struct Entry {
	min: Duration,
	max: Duration,
	deadline: Instant,
	active: bool,
	buffered: bool,
	generation: u64,
}

/// Registry of per-notifier buffer timers, dispatching expirations onto a shared channel.
#[derive(Clone)]
pub struct Timers {
	entries: Arc<std::sync::Mutex<HashMap<String, Entry>>>,
	trigger_tx: mpsc::Sender<String>,
}
impl Timers {
	/// Build a timer registry whose expirations are delivered on the returned receiver. The
	/// channel is sized to roughly half the view-update buffer per spec §5's backpressure policy.
	pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
		let (trigger_tx, trigger_rx) = mpsc::channel(capacity.max(1));

		(Self { entries: Arc::new(std::sync::Mutex::new(HashMap::new())), trigger_tx }, trigger_rx)
	}

	/// Register or update the `(min, max)` policy for `id`. Returns `true` when the timer is
	/// newly added; idempotent for existing timers (the policy is updated, the active/buffered
	/// state is left untouched).
	pub fn add(&self, id: &str, min: Duration, max: Duration) -> bool {
		let mut entries = self.lock();

		if let Some(entry) = entries.get_mut(id) {
			entry.min = min;
			entry.max = max;

			false
		} else {
			entries.insert(
				id.to_owned(),
				Entry { min, max, deadline: Instant::now(), active: false, buffered: false, generation: 0 },
			);

			true
		}
	}

	/// Record activity for `id`. Returns whether the timer is now active (debouncing); `false`
	/// both when `id` has no registered timer and right after it fires.
	pub fn tick(&self, id: &str) -> bool {
		let (duration, generation) = {
			let mut entries = self.lock();
			let Some(entry) = entries.get_mut(id) else { return false };
			let now = Instant::now();

			if !entry.active {
				entry.active = true;
				entry.buffered = false;
				entry.deadline = now + entry.max;
			} else if now >= entry.deadline {
				return true;
			}

			entry.generation += 1;

			let duration =
				if now + entry.min < entry.deadline { entry.min } else { entry.deadline.saturating_duration_since(now) };

			(duration, entry.generation)
		};

		self.spawn_expiry(id.to_owned(), duration, generation);

		true
	}

	/// Deactivate `id`, clear its buffered flag, and cancel any pending expiry.
	pub fn reset(&self, id: &str) {
		let mut entries = self.lock();

		if let Some(entry) = entries.get_mut(id) {
			entry.active = false;
			entry.buffered = false;
			entry.generation += 1;
		}
	}

	/// Whether `id`'s timer has fired and not yet been reset.
	pub fn buffered(&self, id: &str) -> bool {
		self.lock().get(id).map(|entry| entry.buffered).unwrap_or(false)
	}

	/// Cancel and remove every timer.
	pub fn stop(&self) {
		self.lock().clear();
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
		self.entries.lock().expect("timer registry lock poisoned")
	}

	fn spawn_expiry(&self, id: String, duration: Duration, generation: u64) {
		let entries = self.entries.clone();
		let trigger_tx = self.trigger_tx.clone();

		tokio::spawn(async move {
			tokio::time::sleep(duration).await;

			let should_fire = {
				let mut entries = entries.lock().expect("timer registry lock poisoned");

				match entries.get_mut(&id) {
					Some(entry) if entry.active && entry.generation == generation => {
						entry.active = false;
						entry.buffered = true;

						true
					},
					_ => false,
				}
			};

			if should_fire {
				#[cfg(feature = "metrics")]
				crate::metrics::record_buffer_fired(&id);

				let _ = trigger_tx.send(id).await;
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn first_tick_fires_no_sooner_than_min_no_later_than_max() {
		let (timers, mut rx) = Timers::new(8);

		timers.add("tpl", Duration::from_millis(30), Duration::from_millis(500));
		assert!(timers.tick("tpl"));

		tokio::time::advance(Duration::from_millis(29)).await;
		assert!(rx.try_recv().is_err(), "must not fire before min");

		tokio::time::advance(Duration::from_millis(5)).await;
		let fired = rx.recv().await;
		assert_eq!(fired.as_deref(), Some("tpl"));
		assert!(timers.buffered("tpl"));
	}

	#[tokio::test(start_paused = true)]
	async fn repeated_ticks_never_push_past_the_deadline() {
		let (timers, mut rx) = Timers::new(8);

		timers.add("tpl", Duration::from_millis(10), Duration::from_millis(30));
		timers.tick("tpl");

		for _ in 0..10 {
			tokio::time::advance(Duration::from_millis(5)).await;
			timers.tick("tpl");
		}

		let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
		assert_eq!(fired.expect("timer must fire by the deadline").as_deref(), Some("tpl"));
	}

	#[tokio::test(start_paused = true)]
	async fn reset_cancels_the_pending_expiry() {
		let (timers, mut rx) = Timers::new(8);

		timers.add("tpl", Duration::from_millis(10), Duration::from_millis(100));
		timers.tick("tpl");
		timers.reset("tpl");

		tokio::time::advance(Duration::from_millis(200)).await;
		assert!(rx.try_recv().is_err());
		assert!(!timers.buffered("tpl"));
	}
}
