//! The watcher: composes the cache, tracker, timers, and upstream clients into the crate's public
//! surface (spec §4.5).

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot, watch};

use crate::{
	_prelude::*,
	cache::Cache,
	depset::DepSet,
	dependency::{Dependency, clients::Looker},
	events::{EventHandler, NullEventHandler},
	retry::{ExponentialBackoff, RetryPolicy},
	timers::Timers,
	tracker::{Notifier, Tracker},
	view::{View, ViewConfig, ViewError, ViewUpdate},
};

/// Tunables for a [`Watcher`], independent of any single dependency.
#[derive(Clone, Debug)]
pub struct WatcherConfig {
	/// Capacity of the shared view-update channel (spec §5: "buffered, size 2048").
	pub update_buffer: usize,
	/// Capacity of the shared view-error channel (spec §5: "unbuffered" — modeled here as 1,
	/// since `tokio::sync::mpsc` requires a positive capacity; a single pending error still
	/// brings down the active `Wait`, matching the spec's intent).
	pub error_buffer: usize,
	/// Default per-view policy applied to every dependency unless overridden.
	pub view: ViewConfig,
}
impl Default for WatcherConfig {
	fn default() -> Self {
		Self { update_buffer: 2048, error_buffer: 1, view: ViewConfig::default() }
	}
}

/// Builds a [`Watcher`].
pub struct WatcherBuilder {
	config: WatcherConfig,
	clients: Option<Arc<dyn Looker>>,
	events: Arc<dyn EventHandler>,
	retry_policy: Arc<dyn RetryPolicy>,
}
impl WatcherBuilder {
	/// Start from defaults: no clients (only `Fake`/`File`/`Custom` dependencies will work until
	/// one is set), a no-op event handler, and exponential backoff retries.
	pub fn new() -> Self {
		Self {
			config: WatcherConfig::default(),
			clients: None,
			events: Arc::new(NullEventHandler),
			retry_policy: Arc::new(ExponentialBackoff::default()),
		}
	}

	/// Set the upstream [`Looker`] used by every view.
	pub fn clients(mut self, clients: Arc<dyn Looker>) -> Self {
		self.clients = Some(clients);
		self
	}

	/// Set the event handler notified of every view/watcher transition.
	pub fn event_handler(mut self, events: Arc<dyn EventHandler>) -> Self {
		self.events = events;
		self
	}

	/// Override the default retry policy applied to every view.
	pub fn retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
		self.retry_policy = retry_policy;
		self
	}

	/// Override channel capacities and the default per-view policy.
	pub fn config(mut self, config: WatcherConfig) -> Self {
		self.config = config;
		self
	}

	/// Build the watcher. Always returned `Arc`-wrapped: [`Watcher::recaller`] and
	/// [`Watcher::wait_ch`] need to hand out handles back to the watcher itself.
	pub fn build(self) -> Arc<Watcher> {
		let (updates_tx, updates_rx) = mpsc::channel(self.config.update_buffer.max(1));
		let (errors_tx, errors_rx) = mpsc::channel(self.config.error_buffer.max(1));
		let (timers, timer_rx) = Timers::new(self.config.update_buffer.max(2) / 2);
		let (stop_tx, _) = watch::channel(false);
		let (waiting_tx, _) = watch::channel(0u64);

		Arc::new(Watcher {
			cache: Arc::new(Cache::new()),
			tracker: Arc::new(Tracker::new()),
			timers,
			timer_rx: tokio::sync::Mutex::new(timer_rx),
			clients: self.clients.unwrap_or_else(|| Arc::new(NoClients)),
			events: self.events,
			retry_policy: self.retry_policy,
			view_config: self.config.view,
			views: std::sync::Mutex::new(HashMap::new()),
			updates_tx,
			updates_rx: tokio::sync::Mutex::new(updates_rx),
			errors_tx,
			errors_rx: tokio::sync::Mutex::new(errors_rx),
			stop_tx,
			waiting_tx,
		})
	}
}
impl Default for WatcherBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// A [`Looker`] that refuses every call; the default when a [`Watcher`] is built without clients,
/// so that crates exercising only `Fake`/`File`/`Custom` dependencies don't need a real endpoint.
#[derive(Debug)]
struct NoClients;
impl Looker for NoClients {
	fn catalog(&self) -> &crate::dependency::clients::CatalogClient {
		unimplemented!("no catalog client configured on this watcher")
	}

	fn secrets(&self) -> &crate::dependency::clients::SecretsClient {
		unimplemented!("no secrets client configured on this watcher")
	}

	fn stop(&self) {}
}

/// Owns the cache, tracker, timers, and upstream clients for one rendering session; the crate's
/// central type (spec §4.5, §6 "process-wide state: none — a single Watcher instance carries all
/// mutable state").
pub struct Watcher {
	cache: Arc<Cache>,
	tracker: Arc<Tracker>,
	timers: Timers,
	timer_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
	clients: Arc<dyn Looker>,
	events: Arc<dyn EventHandler>,
	retry_policy: Arc<dyn RetryPolicy>,
	view_config: ViewConfig,
	views: std::sync::Mutex<HashMap<String, Arc<View>>>,
	updates_tx: mpsc::Sender<ViewUpdate>,
	updates_rx: tokio::sync::Mutex<mpsc::Receiver<ViewUpdate>>,
	errors_tx: mpsc::Sender<ViewError>,
	errors_rx: tokio::sync::Mutex<mpsc::Receiver<ViewError>>,
	stop_tx: watch::Sender<bool>,
	waiting_tx: watch::Sender<u64>,
}
impl Watcher {
	/// Register one or more notifiers up front. Fails all-or-nothing on a duplicate ID.
	pub fn register(&self, notifiers: impl IntoIterator<Item = Arc<dyn Notifier>>) -> Result<()> {
		self.tracker.register(notifiers)
	}

	/// Record that `notifier` uses `dependency`, creating or reusing its view and marking the
	/// tracked pair `in_use`. Does not itself start polling — see [`Watcher::recaller`].
	pub fn track(&self, notifier: Arc<dyn Notifier>, dependency: Dependency) {
		self.tracker.ensure_registered(notifier.clone());
		let view = self.view_for(&dependency);

		if self.tracker.add(&notifier.id(), view.id()) {
			self.events.handle(crate::events::Event::TrackStart { id: view.id().to_owned(), notifier: notifier.id() });
		}
	}

	/// Start the poll loop for each given dependency's view; idempotent per view.
	pub fn poll(&self, deps: impl IntoIterator<Item = Dependency>) {
		for dependency in deps {
			let view = self.view_for(&dependency);
			view.poll(self.clients.clone(), self.updates_tx.clone(), self.errors_tx.clone());
		}
	}

	/// Start the poll loop for every view currently known to the watcher.
	pub fn poll_all(&self) {
		let views: Vec<_> = self.views.lock().expect("view table lock poisoned").values().cloned().collect();

		for view in views {
			view.poll(self.clients.clone(), self.updates_tx.clone(), self.errors_tx.clone());
		}
	}

	/// Build a [`Recaller`] bound to `notifier`, used from inside template function closures.
	pub fn recaller(self: &Arc<Self>, notifier: Arc<dyn Notifier>) -> Recaller {
		Recaller { watcher: self.clone(), notifier, touched: std::sync::Mutex::new(DepSet::new()) }
	}

	/// `Complete(notifier)`: true iff every dependency tracked for `notifier` had its cached value
	/// read during the most recent mark/render/sweep bracket (spec §4.4, §8 property 6).
	pub fn complete(&self, notifier: &dyn Notifier) -> bool {
		self.tracker.complete(&notifier.id())
	}

	/// Clear usage marks for `notifier` ahead of a render pass.
	pub fn mark(&self, notifier: &dyn Notifier) {
		self.tracker.mark(&notifier.id());
	}

	/// Drop tracked pairs left unused by `notifier`'s last render, stopping and uncaching any view
	/// no longer referenced by anyone (spec §8 property 3).
	pub fn sweep(&self, notifier: &dyn Notifier) {
		let orphaned = self.tracker.sweep(&notifier.id());

		for view_id in &orphaned {
			self.events.handle(crate::events::Event::TrackStop { id: view_id.clone(), notifier: notifier.id() });
		}

		self.drop_views(orphaned);
	}

	/// `Buffer(notifier)`: false before `notifier` has tracked anything; otherwise ticks the
	/// notifier's buffer timer and reports whether it is now actively debouncing.
	pub fn buffer(&self, notifier: &dyn Notifier) -> bool {
		if self.tracker.views_for(&notifier.id()).is_empty() {
			return false;
		}

		self.timers.tick(&notifier.id())
	}

	/// Add or update a `(min, max)` buffer period for the given notifier IDs.
	pub fn set_buffer_period(&self, min: Duration, max: Duration, ids: impl IntoIterator<Item = String>) {
		for id in ids {
			self.timers.add(&id, min, max);
		}
	}

	/// Subscribe to the "a `Wait` call has started" counter, for test observability (spec §4.5
	/// step 2).
	pub fn waiting(&self) -> watch::Receiver<u64> {
		self.waiting_tx.subscribe()
	}

	/// Block until at least one render-worthy change is available, an unrecoverable view error
	/// arrives, or `timeout` elapses. A timeout is treated as "nothing notable happened, try
	/// again" (spec §4.5: "return nil on deadline exceeded") rather than as an error.
	#[tracing::instrument(level = "debug", skip(self))]
	pub async fn wait(&self, timeout: Option<Duration>) -> Result<()> {
		let mut stop_rx = self.stop_tx.subscribe();
		stop_rx.borrow_and_update();

		self.waiting_tx.send_modify(|count| *count += 1);

		let mut updates_rx = self.updates_rx.lock().await;
		let mut timer_rx = self.timer_rx.lock().await;
		let mut errors_rx = self.errors_rx.lock().await;

		let deadline = async {
			match timeout {
				Some(duration) => tokio::time::sleep(duration).await,
				None => std::future::pending().await,
			}
		};
		tokio::pin!(deadline);

		loop {
			tokio::select! {
				biased;

				_ = stop_rx.changed() => return Ok(()),

				Some(update) = updates_rx.recv() => {
					let mut notify = self.apply_update(&update);

					while let Ok(update) = updates_rx.try_recv() {
						notify |= self.apply_update(&update);
					}

					if notify {
						return Ok(());
					}
				},

				Some(_id) = timer_rx.recv() => {
					while timer_rx.try_recv().is_ok() {}
					return Ok(());
				},

				Some(view_error) = errors_rx.recv() => {
					return Err(view_error.error);
				},

				_ = &mut deadline => return Ok(()),
			}
		}
	}

	/// Channel-returning wrapper around [`Watcher::wait`], run on a background task.
	pub fn wait_ch(self: &Arc<Self>, timeout: Option<Duration>) -> oneshot::Receiver<Result<()>> {
		let (tx, rx) = oneshot::channel();
		let watcher = self.clone();

		tokio::spawn(async move {
			let result = watcher.wait(timeout).await;
			let _ = tx.send(result);
		});

		rx
	}

	/// Universal shutdown: stop every timer and view, clear the cache and tracker, release
	/// upstream connections, and signal any in-progress `Wait`. Safe to call more than once.
	pub fn stop(&self) {
		self.timers.stop();

		let views: HashMap<String, Arc<View>> = std::mem::take(&mut self.views.lock().expect("view table lock poisoned"));
		for view in views.values() {
			view.stop();
		}

		self.cache.reset();
		self.tracker.reset();
		self.clients.stop();

		let _ = self.stop_tx.send(true);
	}

	/// Apply one view update to the cache and fan it out to every notifier tracking that view.
	/// A consenting notifier only makes `Wait` return immediately when it has no active buffer
	/// period; otherwise the tick just (re)arms its debounce timer and the eventual return comes
	/// from the timer trigger channel instead (spec §2 component 7, §4.3).
	fn apply_update(&self, update: &ViewUpdate) -> bool {
		self.cache.save(&update.id, update.value.clone());

		let mut notify = false;

		for notifier in self.tracker.notifiers_for(&update.id) {
			if notifier.notify(&update.value) && !self.buffer(notifier.as_ref()) {
				notify = true;
			}
		}

		notify
	}

	fn view_for(&self, dependency: &Dependency) -> Arc<View> {
		let id = dependency.id();
		let mut views = self.views.lock().expect("view table lock poisoned");

		views
			.entry(id)
			.or_insert_with(|| {
				Arc::new(View::new(dependency.clone(), self.view_config.clone(), self.retry_policy.clone(), self.events.clone()))
			})
			.clone()
	}

	fn drop_views(&self, ids: Vec<String>) {
		let mut views = self.views.lock().expect("view table lock poisoned");

		for id in &ids {
			if let Some(view) = views.remove(id) {
				view.stop();
			}

			self.cache.delete(id);
		}
	}
}

/// Returned by [`Watcher::recaller`]; the closure-equivalent a template function uses to resolve
/// one dependency (spec §4.5).
pub struct Recaller {
	watcher: Arc<Watcher>,
	notifier: Arc<dyn Notifier>,
	touched: std::sync::Mutex<DepSet>,
}
impl Recaller {
	/// Resolve `dependency` against the cache, tracking the usage and starting its view if the
	/// value isn't cached yet. Returns `None` when the value has not arrived.
	pub fn recall(&self, dependency: Dependency) -> Option<Value> {
		let id = dependency.id();
		self.touched.lock().expect("depset lock poisoned").add(dependency.clone());
		self.watcher.track(self.notifier.clone(), dependency.clone());

		match self.watcher.cache.recall(&id) {
			Some(value) => {
				self.watcher.tracker.cache_accessed(&self.notifier.id(), &id);

				#[cfg(feature = "metrics")]
				crate::metrics::record_cache_lookup(&id, true);

				Some(value)
			},
			None => {
				self.watcher.poll(std::iter::once(dependency));

				#[cfg(feature = "metrics")]
				crate::metrics::record_cache_lookup(&id, false);

				None
			},
		}
	}

	/// IDs of every distinct dependency this execute pass has touched so far, in first-seen order
	/// (spec §2 component 4: `DepSet`). Used by [`crate::resolver::Resolver`] for its tracing span.
	pub fn touched_ids(&self) -> Vec<String> {
		self.touched.lock().expect("depset lock poisoned").ids().collect()
	}

	/// A snapshot of the process environment, per [`Looker::env`] (spec §6: `Env() → list<string>`).
	pub fn env(&self) -> Vec<String> {
		self.watcher.clients.env()
	}
}
