//! Integration test for mark/sweep orphan collection: switching a template from one dependency to
//! another must drop the old one and pick up the new one on the very next pass.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};
// self
use rendervane::{
	Resolver, WatcherBuilder,
	dependency::{Dependency, testing::FakeQuery},
	template::{Template, engine::Engine},
	tracker::Notifier,
	value::Value,
};

#[tokio::test]
async fn switching_dependencies_drops_the_orphan_and_picks_up_the_replacement() {
	let dep_a = FakeQuery::new("a");
	dep_a.push_value(Value::String("va".into()), 1);

	let dep_b = FakeQuery::new("b");
	dep_b.push_value(Value::String("vb".into()), 1);

	// true => read dep_a, false => read dep_b
	let use_a = Arc::new(AtomicBool::new(true));

	let engine = Engine::new().with_function("echo", {
		let use_a = use_a.clone();
		let dep_a = dep_a.clone();
		let dep_b = dep_b.clone();
		Arc::new(move |recaller, _args: &[String]| {
			let dep = if use_a.load(Ordering::SeqCst) {
				Dependency::Fake(dep_a.clone())
			} else {
				Dependency::Fake(dep_b.clone())
			};

			Ok(recaller.recall(dep).unwrap_or(Value::Null))
		})
	});

	let template = Arc::new(Template::with_name_and_engine("{{echo}}", "out.conf", engine));
	let watcher = WatcherBuilder::new().build();

	let first = Resolver::run(&template, &watcher).unwrap();
	assert!(!first.complete, "dep_a hasn't arrived yet");

	watcher.wait(Some(Duration::from_secs(5))).await.unwrap();

	let second = Resolver::run(&template, &watcher).unwrap();
	assert!(second.complete);
	assert_eq!(second.contents, b"va".to_vec());

	// Complete(T) reached; now redirect the template to dep_b entirely.
	use_a.store(false, Ordering::SeqCst);
	template.notify(&Value::Null);

	let third = Resolver::run(&template, &watcher).unwrap();
	assert!(!third.complete, "dep_b hasn't arrived yet, and dep_a is no longer referenced");
	assert_eq!(third.contents, b"".to_vec(), "the missing-key zero policy applies to the not-yet-cached dep_b");

	watcher.wait(Some(Duration::from_secs(5))).await.unwrap();

	let fourth = Resolver::run(&template, &watcher).unwrap();
	assert!(fourth.complete);
	assert_eq!(fourth.contents, b"vb".to_vec(), "dep_b is live and dep_a no longer contributes to the render");

	watcher.stop();
}
