//! Dependencies: opaque, fetchable values with a stable ID (spec §3).
//!
//! The upstream design exposes dependencies through an open-ended interface; here it is closed
//! into a sum type over the known query kinds plus a `Custom` escape hatch (spec §9 Redesign
//! Flags), so that [`crate::view::View`] and [`crate::cache::Cache`] can key everything off a
//! plain `String` ID without any dynamic dispatch in the common path.

pub mod clients;
pub mod metadata;
pub mod queries;
pub mod testing;

use crate::{
	_prelude::*,
	dependency::{
		clients::Looker,
		metadata::Metadata,
		queries::{
			CaQuery, CatalogQuery, FileQuery, HealthQuery, KvQuery, LeafCertQuery, SecretQuery,
			TokenFileQuery, TokenQuery,
		},
	},
	value::Value,
};

/// An opaque fetchable value source (spec §3).
///
/// `id` must be pure and stable: it is used both as the cache key and as the identity of the
/// [`crate::view::View`] that polls it. `fetch` is expected to block until a value is available,
/// an error occurs, or `stop` is called concurrently — it must treat the latter as silent,
/// voluntary cancellation rather than an error.
#[derive(Clone, Debug)]
pub enum Dependency {
	/// A Consul-shaped service catalog lookup.
	Catalog(CatalogQuery),
	/// A single KV key read.
	Kv(KvQuery),
	/// A KV prefix listing.
	KvList(KvQuery),
	/// A service health-check lookup.
	Health(HealthQuery),
	/// A Vault-shaped secret read.
	Secret(SecretQuery),
	/// A local file read, polled via modification time.
	File(FileQuery),
	/// A CA certificate bundle fetch.
	Ca(CaQuery),
	/// A leaf certificate fetch (paired with [`Dependency::Ca`] for mTLS contexts).
	LeafCert(LeafCertQuery),
	/// A Vault token self-lookup (renewal metadata).
	Token(TokenQuery),
	/// A token sourced from a local file, re-read on change.
	TokenFile(TokenFileQuery),
	/// Test-only stand-in with a scripted, caller-controlled response sequence.
	Fake(testing::FakeQuery),
	/// Escape hatch for dependency kinds not enumerated above.
	Custom(Arc<dyn CustomDependency>),
}
impl Dependency {
	/// Stable identifier for this dependency; equals the [`crate::view::View`] ID the watcher
	/// creates for it (spec §3 invariant).
	pub fn id(&self) -> String {
		match self {
			Dependency::Catalog(q) => format!("catalog({})", q.descriptor()),
			Dependency::Kv(q) => format!("key({})", q.descriptor()),
			Dependency::KvList(q) => format!("keys({})", q.descriptor()),
			Dependency::Health(q) => format!("health({})", q.descriptor()),
			Dependency::Secret(q) => format!("secret({})", q.descriptor()),
			Dependency::File(q) => format!("file({})", q.descriptor()),
			Dependency::Ca(q) => format!("ca({})", q.descriptor()),
			Dependency::LeafCert(q) => format!("leaf_cert({})", q.descriptor()),
			Dependency::Token(q) => format!("token({})", q.descriptor()),
			Dependency::TokenFile(q) => format!("token_file({})", q.descriptor()),
			Dependency::Fake(q) => q.id(),
			Dependency::Custom(custom) => custom.id(),
		}
	}

	/// Whether this dependency supports server-side long-polling (a "blocking query" in Consul
	/// parlance). A `nil`/unchanged response from a blocking dependency means "still blocking",
	/// handled distinctly in the view's poll loop (spec §4.1).
	pub fn is_blocking(&self) -> bool {
		matches!(
			self,
			Dependency::Catalog(_) | Dependency::Kv(_) | Dependency::KvList(_) | Dependency::Health(_)
		)
	}

	/// Perform one blocking fetch against the given upstream clients.
	pub async fn fetch(
		&self,
		clients: &dyn Looker,
		last_index: u64,
		wait: Duration,
	) -> Result<(Value, Metadata)> {
		match self {
			Dependency::Catalog(q) => q.fetch(clients, last_index, wait).await,
			Dependency::Kv(q) => q.fetch_one(clients, last_index, wait).await,
			Dependency::KvList(q) => q.fetch_list(clients, last_index, wait).await,
			Dependency::Health(q) => q.fetch(clients, last_index, wait).await,
			Dependency::Secret(q) => q.fetch(clients).await,
			Dependency::File(q) => q.fetch().await,
			Dependency::Ca(q) => q.fetch(clients).await,
			Dependency::LeafCert(q) => q.fetch(clients).await,
			Dependency::Token(q) => q.fetch(clients).await,
			Dependency::TokenFile(q) => q.fetch().await,
			Dependency::Fake(q) => q.fetch().await,
			Dependency::Custom(custom) => custom.fetch(clients).await,
		}
	}

	/// Idempotently cancel any in-flight fetch for this dependency.
	pub fn stop(&self) {
		if let Dependency::Custom(custom) = self {
			custom.stop();
		}
	}
}

/// Escape hatch for a dependency kind not enumerated by [`Dependency`]'s closed variants.
#[async_trait::async_trait]
pub trait CustomDependency: Send + Sync + std::fmt::Debug {
	/// See [`Dependency::id`].
	fn id(&self) -> String;

	/// See [`Dependency::fetch`]. Blocking-query semantics (`last_index`/`wait`) are left to the
	/// implementation; non-blocking custom dependencies may ignore both arguments.
	async fn fetch(&self, clients: &dyn Looker) -> Result<(Value, Metadata)>;

	/// See [`Dependency::stop`]. Default is a no-op for dependencies with nothing to cancel.
	fn stop(&self) {}
}
