//! The view: a long-running poller for one dependency (spec §4.1).
//!
//! A view owns exactly one [`Dependency`] and runs a single fetch loop, deduping updates by index
//! and by value, retrying transient failures, and downgrading from stale reads once the staleness
//! budget is exhausted. Its identity is the dependency's ID (spec §3 invariant).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};

use crate::{
	_prelude::*,
	dependency::{Dependency, clients::Looker},
	events::{Event, EventHandler},
	retry::{RetryDecision, RetryPolicy},
};

/// Policy knobs for one view's fetch loop.
#[derive(Clone, Debug)]
pub struct ViewConfig {
	/// Maximum duration a single blocking fetch is allowed to wait upstream for a change.
	pub wait: Duration,
	/// Whether a stale read is acceptable at all.
	pub allow_stale: bool,
	/// Once `allow_stale` is set, the staleness budget past which the view forces a fresh read.
	pub max_stale: Duration,
}
impl Default for ViewConfig {
	fn default() -> Self {
		Self { wait: Duration::from_secs(60), allow_stale: false, max_stale: Duration::from_secs(0) }
	}
}

/// A delivered value change, published on the watcher's shared update channel.
#[derive(Clone, Debug)]
pub struct ViewUpdate {
	/// The dependency/view ID this update belongs to.
	pub id: String,
	/// The newly observed value.
	pub value: Value,
}

/// A permanent fetch failure, published on the watcher's shared error channel.
#[derive(Debug)]
pub struct ViewError {
	/// The dependency/view ID that failed.
	pub id: String,
	/// The error that ended the view's poll loop.
	pub error: Error,
}

/// Long-running poller for one [`Dependency`].
///
/// `poll` is idempotent: calling it while the loop is already running is a no-op, matching the
/// "polling for a view is started at most once concurrently" invariant (spec §3).
#[derive(Debug)]
pub struct View {
	dependency: Dependency,
	id: String,
	config: ViewConfig,
	retry_policy: Arc<dyn RetryPolicy>,
	events: Arc<dyn EventHandler>,
	polling: AtomicBool,
	stop_tx: watch::Sender<bool>,
}
impl View {
	/// Build a view over `dependency`, not yet polling.
	pub fn new(
		dependency: Dependency,
		config: ViewConfig,
		retry_policy: Arc<dyn RetryPolicy>,
		events: Arc<dyn EventHandler>,
	) -> Self {
		let id = dependency.id();
		let (stop_tx, _) = watch::channel(false);

		Self { dependency, id, config, retry_policy, events, polling: AtomicBool::new(false), stop_tx }
	}

	/// The dependency ID this view polls; stable for the view's lifetime.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Whether the fetch loop is currently running.
	pub fn is_polling(&self) -> bool {
		self.polling.load(Ordering::SeqCst)
	}

	/// Start the fetch loop if it isn't already running. Returns whether this call started it.
	pub fn poll(
		self: &Arc<Self>,
		clients: Arc<dyn Looker>,
		updates: mpsc::Sender<ViewUpdate>,
		errors: mpsc::Sender<ViewError>,
	) -> bool {
		if self.polling.swap(true, Ordering::SeqCst) {
			return false;
		}

		let view = self.clone();

		tokio::spawn(async move {
			view.run(clients, updates, errors).await;
			view.polling.store(false, Ordering::SeqCst);
		});

		true
	}

	/// Idempotently cancel the in-flight fetch (if any) and end the poll loop.
	pub fn stop(&self) {
		let _ = self.stop_tx.send(true);
		self.dependency.stop();
	}

	#[tracing::instrument(level = "debug", skip_all, fields(id = %self.id))]
	async fn run(&self, clients: Arc<dyn Looker>, updates: mpsc::Sender<ViewUpdate>, errors: mpsc::Sender<ViewError>) {
		let mut stop_rx = self.stop_tx.subscribe();
		let mut last_index = 0u64;
		let mut last_value: Option<Value> = None;
		let mut received = false;
		let mut retries = 0u32;
		let mut allow_stale = self.config.allow_stale;
		let mut last_success_at: Option<Instant> = None;

		self.events.handle(Event::PollingWait { id: self.id.clone() });

		loop {
			if *stop_rx.borrow() {
				return;
			}

			let fetch = self.dependency.fetch(clients.as_ref(), last_index, self.config.wait);

			let outcome = tokio::select! {
				biased;
				_ = stop_rx.changed() => return,
				result = fetch => result,
			};

			match outcome {
				Err(Error::Stopped(_)) => return,
				Err(err) => {
					if is_timeout(&err) {
						self.events.handle(Event::ServerTimeout { id: self.id.clone() });
					} else {
						self.events.handle(Event::ServerError { id: self.id.clone(), message: err.to_string() });
					}

					#[cfg(feature = "metrics")]
					crate::metrics::record_view_poll(&self.id, false);

					if is_non_retryable(&err) {
						let _ = errors.send(ViewError { id: self.id.clone(), error: err }).await;
						return;
					}

					match self.retry_policy.next(retries) {
						RetryDecision::Retry(sleep) => {
							retries += 1;
							self.events.handle(Event::RetryAttempt { id: self.id.clone(), attempt: retries, sleep });

							#[cfg(feature = "metrics")]
							crate::metrics::record_view_retry(&self.id);

							if err.to_string().contains("connection refused") {
								last_index = 0;
							}

							tokio::select! {
								biased;
								_ = stop_rx.changed() => return,
								_ = tokio::time::sleep(sleep) => {},
							}
						},
						RetryDecision::GiveUp => {
							self.events.handle(Event::MaxRetries { id: self.id.clone() });
							let _ = errors.send(ViewError { id: self.id.clone(), error: err }).await;
							return;
						},
					}
				},
				Ok((value, metadata)) => {
					self.events.handle(Event::ServerContacted { id: self.id.clone() });
					retries = 0;

					#[cfg(feature = "metrics")]
					crate::metrics::record_view_poll(&self.id, true);

					if allow_stale && metadata.last_contact > self.config.max_stale {
						allow_stale = false;
						self.events.handle(Event::StaleData { id: self.id.clone() });
						continue;
					}

					rate_limit(&mut last_success_at).await;

					// A source-reported index of 0 means the query kind carries no real index
					// (every non-blocking query — secret/file/ca/leaf_cert/token/token_file —
					// reports `Metadata::fresh(0)`). Comparing it against the view's own
					// zero-initialized `last_index` would make the very first successful fetch
					// look unchanged, so such a report is always treated as fresh at the index
					// layer; deduping then falls entirely to the value-equality check below, the
					// same way a blocking query's index never legitimately starts at 0.
					if metadata.last_index != 0 && metadata.last_index == last_index {
						self.events.handle(Event::NoNewData { id: self.id.clone() });
						continue;
					}

					if metadata.last_index < last_index {
						last_index = 0;
						continue;
					}

					last_index = metadata.last_index;

					if received && last_value.as_ref() == Some(&value) {
						self.events.handle(Event::NoNewData { id: self.id.clone() });
						continue;
					}

					if self.dependency.is_blocking() && matches!(value, Value::Null) {
						self.events.handle(Event::BlockingWait { id: self.id.clone() });
						continue;
					}

					self.events.handle(Event::NewData { id: self.id.clone() });
					received = true;
					last_value = Some(value.clone());

					if updates.send(ViewUpdate { id: self.id.clone(), value }).await.is_err() {
						return;
					}
				},
			}
		}
	}
}

/// HTTP 400 is the one well-known non-retryable status (spec §4.1); everything else is treated as
/// transient and handed to the retry policy.
fn is_non_retryable(err: &Error) -> bool {
	matches!(err, Error::Reqwest(e) if e.status() == Some(reqwest::StatusCode::BAD_REQUEST))
}

/// Whether `err` represents the blocking fetch exceeding its wait window, distinct from a
/// connection-level [`Event::ServerError`].
fn is_timeout(err: &Error) -> bool {
	matches!(err, Error::Reqwest(e) if e.is_timeout()) || matches!(err, Error::Timeout(_))
}

/// Enforce the ~100ms + 0-20ms jitter floor between successful fetch iterations (spec §4.1, §9);
/// a required invariant rather than a tunable, so it takes no config input.
async fn rate_limit(last_success_at: &mut Option<Instant>) {
	let floor = Duration::from_millis(100) + Duration::from_millis(rand::random_range(0..=20));
	let now = Instant::now();

	if let Some(last) = *last_success_at {
		let elapsed = now.saturating_duration_since(last);

		if elapsed < floor {
			tokio::time::sleep(floor - elapsed).await;
		}
	}

	*last_success_at = Some(Instant::now());
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use super::*;
	use crate::{
		dependency::testing::{FakeQuery, NullLooker},
		retry::ExponentialBackoff,
	};

	#[derive(Debug, Default)]
	struct RecordingEvents(Mutex<Vec<Event>>);
	impl EventHandler for RecordingEvents {
		fn handle(&self, event: Event) {
			self.0.lock().expect("event log lock poisoned").push(event);
		}
	}

	fn spawn_view(
		dependency: Dependency,
		retry_policy: impl RetryPolicy + 'static,
	) -> (Arc<View>, mpsc::Receiver<ViewUpdate>, mpsc::Receiver<ViewError>) {
		spawn_view_with_config(
			dependency,
			ViewConfig { wait: Duration::from_millis(50), ..ViewConfig::default() },
			retry_policy,
		)
	}

	fn spawn_view_with_config(
		dependency: Dependency,
		config: ViewConfig,
		retry_policy: impl RetryPolicy + 'static,
	) -> (Arc<View>, mpsc::Receiver<ViewUpdate>, mpsc::Receiver<ViewError>) {
		let view = Arc::new(View::new(dependency, config, Arc::new(retry_policy), Arc::new(RecordingEvents::default())));
		let (updates_tx, updates_rx) = mpsc::channel(8);
		let (errors_tx, errors_rx) = mpsc::channel(8);

		view.poll(Arc::new(NullLooker), updates_tx, errors_tx);

		(view, updates_rx, errors_rx)
	}

	#[tokio::test]
	async fn delivers_exactly_one_update_for_a_single_value() {
		let fake = FakeQuery::new("a");
		fake.push_value(Value::String("foo".into()), 1);

		let (view, mut updates, _errors) = spawn_view(Dependency::Fake(fake), ExponentialBackoff::default());

		let update = updates.recv().await.expect("update expected");
		assert_eq!(update.value, Value::String("foo".into()));

		view.stop();
	}

	#[tokio::test]
	async fn poll_is_idempotent_per_view() {
		let fake = FakeQuery::new("f");
		fake.push_value(Value::String("x".into()), 1);

		let view = Arc::new(View::new(
			Dependency::Fake(fake),
			ViewConfig { wait: Duration::from_millis(50), ..ViewConfig::default() },
			Arc::new(ExponentialBackoff::default()),
			Arc::new(RecordingEvents::default()),
		));
		let (updates_tx, mut updates_rx) = mpsc::channel(8);
		let (errors_tx, _errors_rx) = mpsc::channel(8);

		assert!(!view.is_polling());
		assert!(view.poll(Arc::new(NullLooker), updates_tx.clone(), errors_tx.clone()), "first call starts the loop");
		assert!(view.is_polling());
		assert!(!view.poll(Arc::new(NullLooker), updates_tx, errors_tx), "a second call while already running is a no-op");

		updates_rx.recv().await.expect("update expected");
		view.stop();
	}

	#[tokio::test]
	async fn retries_then_succeeds_without_surfacing_an_error() {
		let fake = FakeQuery::new("b");
		fake.push_error("temporary failure");
		fake.push_value(Value::String("ok".into()), 1);

		let retry = ExponentialBackoff::new(3, Duration::from_millis(10), Duration::from_millis(50));
		let (view, mut updates, mut errors) = spawn_view(Dependency::Fake(fake), retry);

		let update = updates.recv().await.expect("update expected after retry");
		assert_eq!(update.value, Value::String("ok".into()));
		assert!(errors.try_recv().is_err(), "a retried-then-succeeded fetch must not surface an error");

		view.stop();
	}

	#[tokio::test]
	async fn deep_equal_value_at_a_new_index_is_deduped() {
		let fake = FakeQuery::new("c");
		fake.push_value(Value::String("same".into()), 1);
		fake.push_value(Value::String("same".into()), 2);
		fake.push_value(Value::String("different".into()), 3);

		let (view, mut updates, _errors) = spawn_view(Dependency::Fake(fake), ExponentialBackoff::default());

		let first = updates.recv().await.expect("first update expected");
		assert_eq!(first.value, Value::String("same".into()));

		let second = updates.recv().await.expect("second update expected");
		assert_eq!(second.value, Value::String("different".into()), "equal value must be deduped, not redelivered");

		view.stop();
	}

	#[tokio::test]
	async fn an_indexless_source_still_delivers_its_first_value() {
		// Simulates a non-blocking query kind (secret/file/ca/leaf_cert/token/token_file), every
		// one of which reports `Metadata::fresh(0)` — index 0 must not be mistaken for "unchanged
		// from the view's own zero-initialized state".
		let fake = FakeQuery::new("indexless");
		fake.push_value(Value::String("first".into()), 0);
		fake.push_value(Value::String("second".into()), 0);

		let (view, mut updates, _errors) = spawn_view(Dependency::Fake(fake), ExponentialBackoff::default());

		let first = updates.recv().await.expect("an index of 0 must still deliver the first value");
		assert_eq!(first.value, Value::String("first".into()));

		let second = updates.recv().await.expect("a changed value must still be delivered");
		assert_eq!(second.value, Value::String("second".into()), "dedup for an indexless source falls to value equality");

		view.stop();
	}

	#[tokio::test]
	async fn connection_refused_resets_the_last_seen_index() {
		let fake = FakeQuery::new("e");
		fake.push_value(Value::String("first".into()), 5);
		fake.push_connection_refused();
		fake.push_value(Value::String("second".into()), 1);

		let retry = ExponentialBackoff::new(3, Duration::from_millis(5), Duration::from_millis(20));
		let (view, mut updates, mut errors) = spawn_view(Dependency::Fake(fake), retry);

		let first = updates.recv().await.expect("first update expected");
		assert_eq!(first.value, Value::String("first".into()));

		let second = updates.recv().await.expect("an index lower than the last one is accepted once reset by the refusal");
		assert_eq!(second.value, Value::String("second".into()));
		assert!(errors.try_recv().is_err(), "a retried connection refusal must not surface as an error");

		view.stop();
	}

	#[tokio::test]
	async fn stale_read_past_budget_disables_allow_stale_and_refetches() {
		let fake = FakeQuery::new("d");
		fake.push_stale_value(Value::String("stale".into()), 1, Duration::from_secs(10));
		fake.push_value(Value::String("fresh".into()), 2);

		let config = ViewConfig {
			wait: Duration::from_millis(50),
			allow_stale: true,
			max_stale: Duration::from_secs(1),
		};
		let (view, mut updates, _errors) =
			spawn_view_with_config(Dependency::Fake(fake), config, ExponentialBackoff::default());

		let update = updates.recv().await.expect("a fresh update must follow the stale downgrade");
		assert_eq!(update.value, Value::String("fresh".into()), "the stale reading itself must not be delivered");

		view.stop();
	}
}
