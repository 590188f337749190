//! Reactive dependency-watching renderer for text templates whose values come from external
//! configuration and secret sources.
//!
//! Templates call named functions (`key`, `service`, `secret`, ...); each function lazily
//! registers a [`dependency::Dependency`] with the running [`Watcher`], which polls it in the
//! background, caches the result, and wakes waiting renders when something changes. Drive a
//! render to completion by alternating [`Resolver::run`] with [`Watcher::wait`] until the
//! resolver reports `Complete`.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod depset;
pub mod dependency;
pub mod events;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod renderer;
pub mod template;
pub mod timers;
pub mod tracker;
pub mod view;

mod error;
mod resolver;
mod retry;
mod watcher;

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::{
		Error, Result,
		value::Value,
	};
}

pub mod value;

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	error::{Error, ErrNoNewValues, Result},
	resolver::{ResolveEvent, Resolver},
	retry::{RetryDecision, RetryPolicy},
	watcher::{Recaller, Watcher, WatcherBuilder, WatcherConfig},
};

#[cfg(test)]
mod _test {
	use tracing_subscriber as _;
}
