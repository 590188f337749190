//! A minimal, crate-owned template interpreter (spec §6): overridable function maps,
//! configurable delimiters, and a missing-key policy.
//!
//! No example repo in the pack carries a text-template engine with Go's configurable delimiters
//! and recaller-capturing function maps (see `DESIGN.md`), so this one piece is hand-rolled
//! rather than adapted from an ecosystem crate. It only supports what the host language needs:
//! plain function calls, `{{range}}...{{end}}` blocks over a function's list result, and quoted
//! string or `.` (current range item) arguments.

use std::collections::HashMap;

use crate::{_prelude::*, watcher::Recaller};

/// A template function. Takes the in-scope [`Recaller`] so it can resolve a dependency, plus its
/// resolved string arguments. Standing in for Go's "function whose raw type is `(recaller) -> any`
/// is invoked with the recaller to produce the real function" trick (spec §4.6): in Rust the
/// recaller is just an explicit first parameter rather than something discovered via reflection.
pub type TemplateFn = Arc<dyn Fn(&Recaller, &[String]) -> Result<Value> + Send + Sync>;

/// What happens when a function resolves to [`Value::Null`] (a key that hasn't arrived, or a
/// lookup with no match).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
	/// Render as the empty string.
	#[default]
	Zero,
	/// Fail the render with [`Error::MissingKey`].
	Error,
}

#[derive(Clone, Debug)]
enum Arg {
	Literal(String),
	Dot,
}

#[derive(Clone, Debug)]
struct FunctionCall {
	name: String,
	args: Vec<Arg>,
}

#[derive(Clone, Debug)]
enum Node {
	Text(String),
	Call(FunctionCall),
	Range(FunctionCall, Vec<Node>),
}

/// A configured template engine: delimiters, missing-key policy, and the function map.
#[derive(Clone)]
pub struct Engine {
	open: String,
	close: String,
	missing_key: MissingKeyPolicy,
	functions: HashMap<String, TemplateFn>,
}
impl Engine {
	/// An engine with Go-text-template-style `{{`/`}}` delimiters, the zero-value missing-key
	/// policy, and no registered functions.
	pub fn new() -> Self {
		Self { open: "{{".to_owned(), close: "}}".to_owned(), missing_key: MissingKeyPolicy::default(), functions: HashMap::new() }
	}

	/// Override the action delimiters.
	pub fn with_delimiters(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
		self.open = open.into();
		self.close = close.into();
		self
	}

	/// Override the missing-key policy.
	pub fn with_missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
		self.missing_key = policy;
		self
	}

	/// Register or override a function callable from template actions.
	pub fn with_function(mut self, name: impl Into<String>, f: TemplateFn) -> Self {
		self.functions.insert(name.into(), f);
		self
	}

	/// Parse and render `content` against `recaller`.
	pub fn render(&self, content: &str, recaller: &Recaller) -> Result<String> {
		let nodes = parse(content, &self.open, &self.close)?;
		let mut out = String::new();

		self.render_nodes(&nodes, None, recaller, &mut out)?;

		Ok(out)
	}

	fn render_nodes(&self, nodes: &[Node], dot: Option<&Value>, recaller: &Recaller, out: &mut String) -> Result<()> {
		for node in nodes {
			match node {
				Node::Text(text) => out.push_str(text),
				Node::Call(call) => out.push_str(&self.eval_call(call, dot, recaller)?.as_display()),
				Node::Range(call, body) => {
					let value = self.eval_call(call, dot, recaller)?;

					for item in value.as_list() {
						let item_value = Value::String(item);
						self.render_nodes(body, Some(&item_value), recaller, out)?;
					}
				},
			}
		}

		Ok(())
	}

	fn eval_call(&self, call: &FunctionCall, dot: Option<&Value>, recaller: &Recaller) -> Result<Value> {
		let args: Vec<String> = call
			.args
			.iter()
			.map(|arg| match arg {
				Arg::Literal(s) => s.clone(),
				Arg::Dot => dot.map(Value::as_display).unwrap_or_default(),
			})
			.collect();

		let func = self
			.functions
			.get(&call.name)
			.ok_or_else(|| Error::TemplateExecute(format!("unknown function '{}'", call.name)))?;

		let value = func(recaller, &args)?;

		if matches!(value, Value::Null) && self.missing_key == MissingKeyPolicy::Error {
			return Err(Error::MissingKey(call.name.clone()));
		}

		Ok(value)
	}
}
impl Default for Engine {
	fn default() -> Self {
		Self::new()
	}
}
impl std::fmt::Debug for Engine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Engine")
			.field("open", &self.open)
			.field("close", &self.close)
			.field("missing_key", &self.missing_key)
			.field("functions", &self.functions.keys().collect::<Vec<_>>())
			.finish()
	}
}

fn parse(content: &str, open: &str, close: &str) -> Result<Vec<Node>> {
	let mut top = Vec::new();
	let mut stack: Vec<(FunctionCall, Vec<Node>)> = Vec::new();
	let mut pos = 0usize;

	loop {
		let Some(start) = content[pos..].find(open).map(|i| pos + i) else {
			push(&mut top, &mut stack, Node::Text(content[pos..].to_owned()));
			break;
		};

		push(&mut top, &mut stack, Node::Text(content[pos..start].to_owned()));

		let after_open = start + open.len();
		let end = content[after_open..]
			.find(close)
			.map(|i| after_open + i)
			.ok_or_else(|| Error::TemplateParse(format!("unterminated action starting at byte {start}")))?;

		let tokens = tokenize(content[after_open..end].trim())?;
		let Some(keyword) = tokens.first() else {
			return Err(Error::TemplateParse("empty action".into()));
		};

		match keyword.as_str() {
			"end" => {
				let (call, body) =
					stack.pop().ok_or_else(|| Error::TemplateParse("'end' without a matching 'range'".into()))?;
				push(&mut top, &mut stack, Node::Range(call, body));
			},
			"range" => stack.push((parse_call(&tokens[1..])?, Vec::new())),
			_ => push(&mut top, &mut stack, Node::Call(parse_call(&tokens)?)),
		}

		pos = end + close.len();
	}

	if !stack.is_empty() {
		return Err(Error::TemplateParse("missing 'end' for a 'range' action".into()));
	}

	Ok(top)
}

fn push(top: &mut Vec<Node>, stack: &mut [(FunctionCall, Vec<Node>)], node: Node) {
	if let Node::Text(text) = &node {
		if text.is_empty() {
			return;
		}
	}

	match stack.last_mut() {
		Some((_, body)) => body.push(node),
		None => top.push(node),
	}
}

fn parse_call(tokens: &[String]) -> Result<FunctionCall> {
	let Some(name) = tokens.first() else {
		return Err(Error::TemplateParse("empty function call".into()));
	};

	let args = tokens[1..].iter().map(|t| if t == "." { Arg::Dot } else { Arg::Literal(t.clone()) }).collect();

	Ok(FunctionCall { name: name.clone(), args })
}

fn tokenize(src: &str) -> Result<Vec<String>> {
	let mut tokens = Vec::new();
	let mut chars = src.chars().peekable();

	while let Some(&c) = chars.peek() {
		if c.is_whitespace() {
			chars.next();
			continue;
		}

		if c == '"' {
			chars.next();
			let mut s = String::new();

			loop {
				match chars.next() {
					Some('"') => break,
					Some(ch) => s.push(ch),
					None => return Err(Error::TemplateParse("unterminated string literal".into())),
				}
			}

			tokens.push(s);
		} else {
			let mut s = String::new();

			while let Some(&ch) = chars.peek() {
				if ch.is_whitespace() {
					break;
				}

				s.push(ch);
				chars.next();
			}

			tokens.push(s);
		}
	}

	Ok(tokens)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		dependency::{Dependency, testing::FakeQuery},
		watcher::WatcherBuilder,
	};

	fn words_fn() -> TemplateFn {
		Arc::new(|_recaller, args| Ok(Value::List(args.to_vec())))
	}

	fn echo_fn(fakes: HashMap<String, FakeQuery>) -> TemplateFn {
		Arc::new(move |recaller, args| {
			let key = args.first().cloned().unwrap_or_default();
			let fake = fakes.get(&key).cloned().unwrap_or_else(|| FakeQuery::new(&key));

			Ok(recaller.recall(Dependency::Fake(fake)).unwrap_or(Value::Null))
		})
	}

	#[tokio::test]
	async fn single_call_renders_once_the_value_is_cached() {
		let fake = FakeQuery::new("foo");
		fake.push_value(Value::String("foo".into()), 1);
		let mut fakes = HashMap::new();
		fakes.insert("foo".to_owned(), fake);

		let engine = Engine::new().with_function("echo", echo_fn(fakes));
		let watcher = WatcherBuilder::new().build();
		let notifier: Arc<dyn crate::tracker::Notifier> = Arc::new(crate::template::Template::new(r#"{{echo "foo"}}"#));
		let recaller = watcher.recaller(notifier);

		assert_eq!(engine.render(r#"{{echo "foo"}}"#, &recaller).unwrap(), "");

		watcher.wait(Some(Duration::from_secs(5))).await.unwrap();

		assert_eq!(engine.render(r#"{{echo "foo"}}"#, &recaller).unwrap(), "foo");
		watcher.stop();
	}

	#[tokio::test]
	async fn range_over_words_echoes_each_item_in_order() {
		let a = FakeQuery::new("foo");
		a.push_value(Value::String("foo".into()), 1);
		let b = FakeQuery::new("bar");
		b.push_value(Value::String("bar".into()), 1);

		let mut fakes = HashMap::new();
		fakes.insert("foo".to_owned(), a);
		fakes.insert("bar".to_owned(), b);

		let engine = Engine::new().with_function("words", words_fn()).with_function("echo", echo_fn(fakes));
		let watcher = WatcherBuilder::new().build();
		let notifier: Arc<dyn crate::tracker::Notifier> =
			Arc::new(crate::template::Template::new(r#"{{range words "foo" "bar"}}{{echo .}}{{end}}"#));
		let recaller = watcher.recaller(notifier);
		let content = r#"{{range words "foo" "bar"}}{{echo .}}{{end}}"#;

		assert_eq!(engine.render(content, &recaller).unwrap(), "");
		watcher.wait(Some(Duration::from_secs(5))).await.unwrap();
		assert_eq!(engine.render(content, &recaller).unwrap(), "foobar");
		watcher.stop();
	}

	#[test]
	fn unterminated_action_is_a_parse_error() {
		let err = parse("{{echo \"foo\"", "{{", "}}").unwrap_err();
		assert!(matches!(err, Error::TemplateParse(_)));
	}

	#[tokio::test]
	async fn custom_delimiters_are_honored() {
		let engine = Engine::new().with_delimiters("<%", "%>").with_function("echo", words_fn());
		let watcher = WatcherBuilder::new().build();
		let notifier: Arc<dyn crate::tracker::Notifier> = Arc::new(crate::template::Template::new("x"));
		let recaller = watcher.recaller(notifier);

		assert_eq!(engine.render(r#"<%echo "hi"%>"#, &recaller).unwrap(), "hi");
		assert_eq!(engine.render(r#"{{echo "hi"}}"#, &recaller).unwrap(), r#"{{echo "hi"}}"#, "the old delimiters must no longer be recognized");

		watcher.stop();
	}

	#[tokio::test]
	async fn missing_key_policy_error_fails_the_render_instead_of_zeroing() {
		let missing = Arc::new(|_recaller: &Recaller, _args: &[String]| Ok(Value::Null)) as TemplateFn;

		let zero_engine = Engine::new().with_function("lookup", missing.clone());
		let watcher = WatcherBuilder::new().build();
		let notifier: Arc<dyn crate::tracker::Notifier> = Arc::new(crate::template::Template::new("x"));
		let recaller = watcher.recaller(notifier);

		assert_eq!(zero_engine.render(r#"{{lookup "k"}}"#, &recaller).unwrap(), "", "the default policy zeroes a missing key");

		let erroring_engine =
			Engine::new().with_function("lookup", missing).with_missing_key_policy(MissingKeyPolicy::Error);
		let err = erroring_engine.render(r#"{{lookup "k"}}"#, &recaller).unwrap_err();
		assert!(matches!(err, Error::MissingKey(name) if name == "lookup"));

		watcher.stop();
	}
}
