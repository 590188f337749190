//! Concrete query structs for each closed [`super::Dependency`] variant.
//!
//! These are the "thin wrappers" the spec (§1) calls out of scope for the core: each one knows
//! how to turn its own parameters into an upstream request and a [`Value`], but carries none of
//! the polling, caching, or notification logic — that lives in [`crate::view`].

use crate::{_prelude::*, dependency::clients::Looker, dependency::metadata::Metadata, value::Value};

/// A Consul-shaped service catalog lookup (`catalog.service(name)`).
#[derive(Clone, Debug)]
pub struct CatalogQuery {
	/// Service name to look up.
	pub service: String,
	/// Optional datacenter override.
	pub datacenter: Option<String>,
}
impl CatalogQuery {
	/// Build a query for the given service name.
	pub fn new(service: impl Into<String>) -> Self {
		Self { service: service.into(), datacenter: None }
	}

	pub(crate) fn descriptor(&self) -> String {
		match &self.datacenter {
			Some(dc) => format!("{}@{dc}", self.service),
			None => self.service.clone(),
		}
	}

	pub(crate) async fn fetch(
		&self,
		clients: &dyn Looker,
		last_index: u64,
		wait: Duration,
	) -> Result<(Value, Metadata)> {
		let path = format!("/v1/catalog/service/{}", self.service);
		let (body, meta) = clients.catalog().blocking_get(&path, last_index, wait).await?;
		let instances = body
			.as_array()
			.map(|entries| {
				entries
					.iter()
					.filter_map(|entry| entry.get("ServiceID").and_then(|v| v.as_str()))
					.map(str::to_owned)
					.collect()
			})
			.unwrap_or_default();

		Ok((Value::List(instances), meta))
	}
}

/// A KV key read or prefix listing (`key(path)` / `keys(prefix)`).
#[derive(Clone, Debug)]
pub struct KvQuery {
	/// Key or prefix to query.
	pub path: String,
}
impl KvQuery {
	/// Build a query for the given key or prefix.
	pub fn new(path: impl Into<String>) -> Self {
		Self { path: path.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		self.path.clone()
	}

	pub(crate) async fn fetch_one(
		&self,
		clients: &dyn Looker,
		last_index: u64,
		wait: Duration,
	) -> Result<(Value, Metadata)> {
		let path = format!("/v1/kv/{}", self.path);
		let (body, meta) = clients.catalog().blocking_get(&path, last_index, wait).await?;
		let value = body
			.as_array()
			.and_then(|entries| entries.first())
			.and_then(|entry| entry.get("Value"))
			.and_then(|v| v.as_str())
			.map(str::to_owned)
			.map(Value::String)
			.unwrap_or(Value::Null);

		Ok((value, meta))
	}

	pub(crate) async fn fetch_list(
		&self,
		clients: &dyn Looker,
		last_index: u64,
		wait: Duration,
	) -> Result<(Value, Metadata)> {
		let path = format!("/v1/kv/{}?recurse=true", self.path);
		let (body, meta) = clients.catalog().blocking_get(&path, last_index, wait).await?;
		let map = body
			.as_array()
			.map(|entries| {
				entries
					.iter()
					.filter_map(|entry| {
						let key = entry.get("Key")?.as_str()?.to_owned();
						let value = entry.get("Value").and_then(|v| v.as_str()).unwrap_or("").to_owned();
						Some((key, value))
					})
					.collect()
			})
			.unwrap_or_default();

		Ok((Value::Map(map), meta))
	}
}

/// A service health-check lookup (`service(name)` with health filtering).
#[derive(Clone, Debug)]
pub struct HealthQuery {
	/// Service name to check.
	pub service: String,
	/// Only return passing instances when true.
	pub passing_only: bool,
}
impl HealthQuery {
	/// Build a health query for the given service name.
	pub fn new(service: impl Into<String>) -> Self {
		Self { service: service.into(), passing_only: true }
	}

	pub(crate) fn descriptor(&self) -> String {
		format!("{}[passing={}]", self.service, self.passing_only)
	}

	pub(crate) async fn fetch(
		&self,
		clients: &dyn Looker,
		last_index: u64,
		wait: Duration,
	) -> Result<(Value, Metadata)> {
		let mut path = format!("/v1/health/service/{}", self.service);
		if self.passing_only {
			path.push_str("?passing=true");
		}

		let (body, meta) = clients.catalog().blocking_get(&path, last_index, wait).await?;
		let instances = body
			.as_array()
			.map(|entries| {
				entries
					.iter()
					.filter_map(|entry| entry.pointer("/Service/ID").and_then(|v| v.as_str()))
					.map(str::to_owned)
					.collect()
			})
			.unwrap_or_default();

		Ok((Value::List(instances), meta))
	}
}

/// A Vault-shaped secret read (`secret(path)`). Non-blocking: secrets are read fresh on every
/// poll iteration and re-fetched on the view's regular (non-long-poll) schedule.
#[derive(Clone, Debug)]
pub struct SecretQuery {
	/// Path of the secret to read.
	pub path: String,
}
impl SecretQuery {
	/// Build a query for the given secret path.
	pub fn new(path: impl Into<String>) -> Self {
		Self { path: path.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		self.path.clone()
	}

	pub(crate) async fn fetch(&self, clients: &dyn Looker) -> Result<(Value, Metadata)> {
		let value = clients.secrets().read(&self.path).await?;

		Ok((value, Metadata::fresh(0)))
	}
}

/// A local file read (`file(path)`), re-polled on a fixed interval by the view.
#[derive(Clone, Debug)]
pub struct FileQuery {
	/// Filesystem path to read.
	pub path: std::path::PathBuf,
}
impl FileQuery {
	/// Build a query for the given file path.
	pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		self.path.display().to_string()
	}

	pub(crate) async fn fetch(&self) -> Result<(Value, Metadata)> {
		let contents = tokio::fs::read_to_string(&self.path).await?;

		Ok((Value::String(contents), Metadata::fresh(0)))
	}
}

/// A CA certificate bundle fetch, paired with [`LeafCertQuery`] for mTLS rendering contexts.
#[derive(Clone, Debug)]
pub struct CaQuery {
	/// Logical name of the CA, used only for the dependency ID.
	pub name: String,
}
impl CaQuery {
	/// Build a query for the named CA.
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		self.name.clone()
	}

	pub(crate) async fn fetch(&self, clients: &dyn Looker) -> Result<(Value, Metadata)> {
		let value = clients.secrets().read(&format!("pki/ca/{}", self.name)).await?;

		Ok((value, Metadata::fresh(0)))
	}
}

/// A leaf certificate fetch for a given CA/role pair.
#[derive(Clone, Debug)]
pub struct LeafCertQuery {
	/// CA name the leaf certificate is issued from.
	pub ca: String,
	/// PKI role used to issue the certificate.
	pub role: String,
}
impl LeafCertQuery {
	/// Build a query for the given CA/role pair.
	pub fn new(ca: impl Into<String>, role: impl Into<String>) -> Self {
		Self { ca: ca.into(), role: role.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		format!("{}/{}", self.ca, self.role)
	}

	pub(crate) async fn fetch(&self, clients: &dyn Looker) -> Result<(Value, Metadata)> {
		let value =
			clients.secrets().read(&format!("pki/issue/{}/{}", self.ca, self.role)).await?;

		Ok((value, Metadata::fresh(0)))
	}
}

/// A Vault token self-lookup, used to surface renewal metadata to templates.
#[derive(Clone, Debug)]
pub struct TokenQuery;
impl TokenQuery {
	pub(crate) fn descriptor(&self) -> String {
		"self".to_owned()
	}

	pub(crate) async fn fetch(&self, clients: &dyn Looker) -> Result<(Value, Metadata)> {
		let value = clients.secrets().read("auth/token/lookup-self").await?;

		Ok((value, Metadata::fresh(0)))
	}
}

/// A token sourced from a local file, re-read whenever the file changes.
#[derive(Clone, Debug)]
pub struct TokenFileQuery {
	/// Filesystem path holding the token.
	pub path: std::path::PathBuf,
}
impl TokenFileQuery {
	/// Build a query for the given token file path.
	pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub(crate) fn descriptor(&self) -> String {
		self.path.display().to_string()
	}

	pub(crate) async fn fetch(&self) -> Result<(Value, Metadata)> {
		let token = tokio::fs::read_to_string(&self.path).await?;

		Ok((Value::String(token.trim().to_owned()), Metadata::fresh(0)))
	}
}
