//! The resolver: drives one template through a single execute pass against a watcher (spec §2
//! component 9, §4.6).

use crate::{_prelude::*, template::{ExecuteOutcome, Template}, watcher::Watcher};

/// Outcome of one [`Resolver::run`] pass.
#[derive(Clone, Debug)]
pub struct ResolveEvent {
	/// True iff every dependency the template referenced this pass resolved to a cached value
	/// (spec §4.6, §8 property 6).
	pub complete: bool,
	/// The rendered (or previously cached) output bytes.
	pub contents: Vec<u8>,
	/// True when the template's dirty flag wasn't raised and `contents` is unchanged from the
	/// previous pass.
	pub no_change: bool,
}

/// Single-pass driver: `Execute` a template against a watcher's [`crate::watcher::Recaller`],
/// bracketed by mark/sweep so the watcher can collect views the template no longer references.
pub struct Resolver;
impl Resolver {
	/// Run one resolve pass. Callers loop `run` → [`Watcher::wait`] → `run` until
	/// [`ResolveEvent::complete`] is true.
	#[tracing::instrument(level = "debug", skip_all, fields(id = %template.id()))]
	pub fn run(template: &Arc<Template>, watcher: &Arc<Watcher>) -> Result<ResolveEvent> {
		watcher.mark(template.as_ref());

		let recaller = watcher.recaller(template.clone());
		let outcome = template.execute(&recaller)?;

		tracing::debug!(deps = ?recaller.touched_ids(), "template execute touched dependencies");

		watcher.sweep(template.as_ref());

		let complete = watcher.complete(template.as_ref());
		let no_change = matches!(outcome, ExecuteOutcome::NoNewValues(_, _));

		Ok(ResolveEvent { complete, contents: outcome.into_bytes(), no_change })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		dependency::{Dependency, testing::FakeQuery},
		template::engine::Engine,
		watcher::WatcherBuilder,
	};

	fn echo_engine(fake: FakeQuery) -> Engine {
		Engine::new().with_function("echo", Arc::new(move |recaller, _args: &[String]| {
			Ok(recaller.recall(Dependency::Fake(fake.clone())).unwrap_or(Value::Null))
		}))
	}

	#[tokio::test]
	async fn single_dependency_scenario_completes_after_one_wait() {
		let fake = FakeQuery::new("foo");
		fake.push_value(Value::String("foo".into()), 1);

		let template = Arc::new(Template::with_engine(r#"{{echo "foo"}}"#, echo_engine(fake)));
		let watcher = WatcherBuilder::new().build();

		let first = Resolver::run(&template, &watcher).unwrap();
		assert!(!first.complete);
		assert_eq!(first.contents, b"".to_vec());

		watcher.wait(Some(Duration::from_secs(5))).await.unwrap();

		let second = Resolver::run(&template, &watcher).unwrap();
		assert!(second.complete);
		assert_eq!(second.contents, b"foo".to_vec());

		watcher.stop();
	}
}
