//! Integration test for the buffer (debounce) window coalescing rapid dependency updates into a
//! single render.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};
// crates.io
use async_trait::async_trait;
// self
use rendervane::{
	Resolver, WatcherBuilder,
	dependency::{CustomDependency, Dependency, clients::Looker, metadata::Metadata},
	template::{Template, engine::Engine},
	value::Value,
};

/// Delivers `value` exactly once, after sleeping `delay`, then blocks forever so the view's loop
/// parks instead of busy-spinning on a second fetch.
#[derive(Debug)]
struct OneShot {
	id: String,
	delay: Duration,
	value: &'static str,
	delivered: AtomicBool,
}
#[async_trait]
impl CustomDependency for OneShot {
	fn id(&self) -> String {
		self.id.clone()
	}

	async fn fetch(&self, _clients: &dyn Looker) -> rendervane::Result<(Value, Metadata)> {
		if self.delivered.swap(true, Ordering::SeqCst) {
			std::future::pending().await
		}

		tokio::time::sleep(self.delay).await;

		Ok((Value::String(self.value.to_owned()), Metadata::fresh(1)))
	}
}

#[tokio::test(start_paused = true)]
async fn buffered_render_coalesces_updates_spread_across_the_window() {
	let a = Dependency::Custom(Arc::new(OneShot {
		id: "a".into(),
		delay: Duration::from_millis(10),
		value: "foo_10ms",
		delivered: AtomicBool::new(false),
	}));
	let b = Dependency::Custom(Arc::new(OneShot {
		id: "b".into(),
		delay: Duration::from_millis(20),
		value: "foo_20ms",
		delivered: AtomicBool::new(false),
	}));
	let c = Dependency::Custom(Arc::new(OneShot {
		id: "c".into(),
		delay: Duration::from_millis(30),
		value: "foo_30ms",
		delivered: AtomicBool::new(false),
	}));

	let engine = Engine::new()
		.with_function("a", {
			let a = a.clone();
			Arc::new(move |recaller, _args: &[String]| Ok(recaller.recall(a.clone()).unwrap_or(Value::Null)))
		})
		.with_function("b", {
			let b = b.clone();
			Arc::new(move |recaller, _args: &[String]| Ok(recaller.recall(b.clone()).unwrap_or(Value::Null)))
		})
		.with_function("c", {
			let c = c.clone();
			Arc::new(move |recaller, _args: &[String]| Ok(recaller.recall(c.clone()).unwrap_or(Value::Null)))
		});

	let template = Arc::new(Template::with_name_and_engine("{{a}} {{b}} {{c}}", "out.conf", engine));
	let watcher = WatcherBuilder::new().build();

	watcher.set_buffer_period(Duration::from_millis(30), Duration::from_millis(500), [template.id().to_owned()]);

	let first = Resolver::run(&template, &watcher).unwrap();
	assert!(!first.complete, "none of the three have arrived yet");

	watcher.wait(Some(Duration::from_secs(5))).await.expect("the buffer window must eventually fire");

	let second = Resolver::run(&template, &watcher).unwrap();
	assert!(second.complete, "all three values must have landed by the time the buffer fired");
	assert_eq!(
		String::from_utf8(second.contents).unwrap(),
		"foo_10ms foo_20ms foo_30ms",
		"a single buffered Wait must surface every update collected during the window"
	);

	watcher.stop();
}
