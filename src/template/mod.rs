//! The template notifier: parsed content, a dirty flag, a last-rendered cache, and
//! `execute(recaller)` (spec §2 component 8, §4.6).

pub mod engine;

use std::sync::{
	Mutex,
	atomic::{AtomicBool, Ordering},
};

use md5::{Digest, Md5};

use crate::{
	_prelude::*,
	error::ErrNoNewValues,
	template::engine::Engine,
	tracker::Notifier,
	watcher::Recaller,
};

/// Outcome of [`Template::execute`].
#[derive(Debug)]
pub enum ExecuteOutcome {
	/// The dirty flag wasn't raised since the last render; `bytes` is the previously rendered
	/// output, returned unchanged alongside the spec's `ErrNoNewValues` sentinel (spec §4.6,
	/// §7).
	NoNewValues(Vec<u8>, ErrNoNewValues),
	/// The template was freshly parsed and rendered.
	Rendered(Vec<u8>),
}
impl ExecuteOutcome {
	/// The rendered bytes, regardless of which variant this is.
	pub fn into_bytes(self) -> Vec<u8> {
		match self {
			ExecuteOutcome::NoNewValues(bytes, _) | ExecuteOutcome::Rendered(bytes) => bytes,
		}
	}
}

/// A parsed template: content, an [`Engine`] configured with its function map/delimiters/missing-
/// key policy, a dirty flag primed `true` on construction (spec §3: "a fresh template is primed
/// dirty"), and a cache of the last-rendered bytes.
#[derive(Debug)]
pub struct Template {
	id: String,
	content: String,
	engine: Engine,
	dirty: AtomicBool,
	last_rendered: Mutex<Vec<u8>>,
}
impl Template {
	/// Build a template whose ID is the hex-MD5 of its content, with an empty (caller-populated)
	/// [`Engine`].
	pub fn new(content: impl Into<String>) -> Self {
		Self::with_engine(content, Engine::new())
	}

	/// Build a template identified by `hex_md5(content):name`, so that two templates sharing
	/// identical content but serving different outputs don't collide.
	pub fn with_name(content: impl Into<String>, name: impl AsRef<str>) -> Self {
		Self::with_name_and_engine(content, name, Engine::new())
	}

	/// Build a template identified by `hex_md5(content):name` with a caller-supplied [`Engine`].
	pub fn with_name_and_engine(content: impl Into<String>, name: impl AsRef<str>, engine: Engine) -> Self {
		let content = content.into();
		let id = format!("{}:{}", content_hash(&content), name.as_ref());

		Self { id, content, engine, dirty: AtomicBool::new(true), last_rendered: Mutex::new(Vec::new()) }
	}

	/// Build a template with a caller-supplied [`Engine`] (custom delimiters, function map, or
	/// missing-key policy).
	pub fn with_engine(content: impl Into<String>, engine: Engine) -> Self {
		let content = content.into();
		let id = content_hash(&content);

		Self { id, content, engine, dirty: AtomicBool::new(true), last_rendered: Mutex::new(Vec::new()) }
	}

	/// Stable template ID: `hex_md5(content)`, optionally suffixed with a name (spec §3).
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Run one execution pass (spec §4.6):
	/// 1. If the dirty flag isn't raised, return the cached bytes plus [`ErrNoNewValues`].
	/// 2. Otherwise render against `recaller` and cache the result.
	#[tracing::instrument(level = "debug", skip_all, fields(id = %self.id))]
	pub fn execute(&self, recaller: &Recaller) -> Result<ExecuteOutcome> {
		if !self.dirty.swap(false, Ordering::SeqCst) {
			let bytes = self.last_rendered.lock().expect("template cache lock poisoned").clone();
			return Ok(ExecuteOutcome::NoNewValues(bytes, ErrNoNewValues));
		}

		let rendered = self.engine.render(&self.content, recaller)?;
		let bytes = rendered.into_bytes();
		*self.last_rendered.lock().expect("template cache lock poisoned") = bytes.clone();

		Ok(ExecuteOutcome::Rendered(bytes))
	}
}
impl Notifier for Template {
	fn id(&self) -> String {
		self.id.clone()
	}

	/// Re-raises the dirty flag and always consents to re-render (spec §3: "`Notify(data)`
	/// re-raises dirty and returns true by default").
	fn notify(&self, _value: &Value) -> bool {
		self.dirty.store(true, Ordering::SeqCst);
		true
	}
}

fn content_hash(content: &str) -> String {
	let mut hasher = Md5::new();
	hasher.update(content.as_bytes());

	hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}
