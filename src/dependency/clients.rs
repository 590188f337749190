//! The `Looker` collaborator: thin HTTP clients shared by every view.
//!
//! These are intentionally shallow. The spec (§1, §6) treats the concrete query
//! implementations as out-of-scope external collaborators and only fixes the contract the core
//! needs: a shared, `Clone`-able handle that knows how to reach the catalog/KV service and the
//! secrets engine, plus a `stop()` to release pooled connections.

use crate::{_prelude::*, dependency::metadata::Metadata, value::Value};

/// Aggregate of the upstream clients a [`crate::view::View`] may need to fetch a dependency.
///
/// Implementations own their own connection pools; `stop` releases them. Held as a single
/// `Arc<dyn Looker>` inside the watcher and shared across every view loop.
pub trait Looker: Send + Sync + std::fmt::Debug {
	/// The catalog/service-discovery client (Consul-shaped).
	fn catalog(&self) -> &CatalogClient;

	/// The secrets engine client (Vault-shaped).
	fn secrets(&self) -> &SecretsClient;

	/// A snapshot of the process environment as `"KEY=VALUE"` pairs.
	///
	/// Default implementation reads `std::env::vars()` directly; overridden by test doubles that
	/// need a deterministic environment.
	fn env(&self) -> Vec<String> {
		std::env::vars().map(|(key, value)| format!("{key}={value}")).collect()
	}

	/// Release idle upstream connections. Called once from [`crate::Watcher::stop`].
	fn stop(&self);
}

/// Default [`Looker`] implementation backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct Clients {
	catalog: CatalogClient,
	secrets: SecretsClient,
}
impl Clients {
	/// Build a client set pointed at the given catalog and secrets base URLs.
	pub fn new(catalog_addr: Url, secrets_addr: Url) -> Result<Self> {
		let http = reqwest::Client::builder()
			.connect_timeout(Duration::from_secs(5))
			.user_agent(concat!("rendervane/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self {
			catalog: CatalogClient { http: http.clone(), base: catalog_addr, token: None },
			secrets: SecretsClient { http, base: secrets_addr, token: None },
		})
	}

	/// Attach a bearer token used for catalog requests (e.g. a Consul ACL token).
	pub fn with_catalog_token(mut self, token: impl Into<String>) -> Self {
		self.catalog.token = Some(token.into());
		self
	}

	/// Attach a bearer token used for secrets requests (e.g. a Vault token).
	pub fn with_secrets_token(mut self, token: impl Into<String>) -> Self {
		self.secrets.token = Some(token.into());
		self
	}
}
impl Looker for Clients {
	fn catalog(&self) -> &CatalogClient {
		&self.catalog
	}

	fn secrets(&self) -> &SecretsClient {
		&self.secrets
	}

	fn stop(&self) {
		tracing::debug!("releasing pooled upstream connections");
	}
}

/// Minimal Consul-shaped catalog/KV client.
#[derive(Clone, Debug)]
pub struct CatalogClient {
	http: reqwest::Client,
	base: Url,
	token: Option<String>,
}
impl CatalogClient {
	/// Perform a single blocking-query-style GET against the catalog, returning the raw JSON
	/// body and the source-reported index from the `X-Consul-Index` header.
	pub async fn blocking_get(
		&self,
		path: &str,
		wait_index: u64,
		wait: Duration,
	) -> Result<(JsonValue, Metadata)> {
		let mut url = self.base.join(path)?;

		{
			let mut pairs = url.query_pairs_mut();
			if wait_index > 0 {
				pairs.append_pair("index", &wait_index.to_string());
				pairs.append_pair("wait", &format!("{}s", wait.as_secs().max(1)));
			}
		}

		let mut request = self.http.get(url);
		if let Some(token) = &self.token {
			request = request.bearer_auth(token);
		}

		let response = request.send().await?;
		let index = response
			.headers()
			.get("x-consul-index")
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.parse::<u64>().ok())
			.unwrap_or(wait_index);
		let body: JsonValue = response.json().await?;

		Ok((body, Metadata::fresh(index)))
	}
}

/// Minimal Vault-shaped secrets client.
#[derive(Clone, Debug)]
pub struct SecretsClient {
	http: reqwest::Client,
	base: Url,
	token: Option<String>,
}
impl SecretsClient {
	/// Read a secret at the given path, returning its `data` object.
	pub async fn read(&self, path: &str) -> Result<Value> {
		let url = self.base.join(path)?;
		let mut request = self.http.get(url);
		if let Some(token) = &self.token {
			request = request.header("X-Vault-Token", token);
		}

		let response = request.send().await?;
		let body: JsonValue = response.json().await?;
		let data = body.get("data").cloned().unwrap_or(JsonValue::Null);

		Ok(Value::Json(data))
	}
}
