//! The event stream (spec §6): a closed set of tagged records emitted synchronously from view
//! poll loops.

use crate::_prelude::*;

/// One event emitted by a [`crate::view::View`] or [`crate::Watcher`].
///
/// Closed by design (spec §9: "avoid open subscription chains") — every poll-loop transition is
/// named here rather than left to ad hoc logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
	/// Low-level diagnostic trace; emitted freely, safe to ignore in production handlers.
	Trace { id: String, message: String },
	/// A blocking-query dependency reported "still blocking" (no new data).
	BlockingWait { id: String },
	/// A fetch reached the upstream successfully, independent of whether the data changed.
	ServerContacted { id: String },
	/// A fetch failed with a transient error.
	ServerError { id: String, message: String },
	/// A fetch timed out.
	ServerTimeout { id: String },
	/// A retry is about to be attempted after sleeping.
	RetryAttempt { id: String, attempt: u32, sleep: Duration },
	/// The retry budget was exhausted; the view is giving up.
	MaxRetries { id: String },
	/// A fetch produced a genuinely new value.
	NewData { id: String },
	/// A fetch returned stale data past the configured staleness budget.
	StaleData { id: String },
	/// A fetch succeeded but produced no new value (index unchanged or value deep-equal).
	NoNewData { id: String },
	/// A notifier began tracking a dependency.
	TrackStart { id: String, notifier: String },
	/// A notifier stopped tracking a dependency (after mark/sweep).
	TrackStop { id: String, notifier: String },
	/// A view's poll loop was started.
	PollingWait { id: String },
}
impl Event {
	/// The dependency or watcher ID this event pertains to.
	pub fn id(&self) -> &str {
		match self {
			Event::Trace { id, .. }
			| Event::BlockingWait { id }
			| Event::ServerContacted { id }
			| Event::ServerError { id, .. }
			| Event::ServerTimeout { id }
			| Event::RetryAttempt { id, .. }
			| Event::MaxRetries { id }
			| Event::NewData { id }
			| Event::StaleData { id }
			| Event::NoNewData { id }
			| Event::TrackStart { id, .. }
			| Event::TrackStop { id, .. }
			| Event::PollingWait { id } => id,
		}
	}
}

/// Receives events emitted by the watcher and its views.
///
/// Handlers are invoked synchronously from the view's poll loop; per spec §6, "handlers must not
/// block". Implementations should defer expensive work (network calls, file I/O) to a channel or
/// background task rather than doing it inline.
pub trait EventHandler: Send + Sync + std::fmt::Debug {
	/// Handle one event.
	fn handle(&self, event: Event);
}

/// An [`EventHandler`] that forwards every event to `tracing` at `debug` level, tagged with its
/// dependency ID.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventHandler;
impl EventHandler for TracingEventHandler {
	fn handle(&self, event: Event) {
		tracing::debug!(id = event.id(), event = ?event, "dependency event");
	}
}

/// An [`EventHandler`] that discards every event; useful in tests that don't care about the
/// event stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventHandler;
impl EventHandler for NullEventHandler {
	fn handle(&self, _event: Event) {}
}
