//! Thin CLI wrapper around the `rendervane` library: parses arguments, wires a [`Watcher`] and
//! one or more `source:destination` template pairs, and drives the resolve/wait loop until every
//! template is complete (or, with `--once`, exits after the first complete pass). Owns no core
//! logic — every decision here delegates straight to the library (spec §1: "interface only").

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use rendervane::{
	Resolver, Watcher, WatcherBuilder,
	dependency::{
		Dependency,
		queries::{CatalogQuery, KvQuery, SecretQuery},
	},
	events::TracingEventHandler,
	renderer::{FileRenderer, Render},
	template::{Template, engine::Engine},
	value::Value,
};
use url::Url;

/// Reactive dependency-watching renderer for text templates whose values come from a Consul-
/// shaped catalog and a Vault-shaped secrets engine.
#[derive(Parser, Debug)]
#[command(name = "rendervane", version, about)]
struct Cli {
	/// Base URL of the catalog/KV service (Consul-shaped).
	#[arg(long, env = "RENDERVANE_CONSUL_ADDR")]
	consul_addr: Option<Url>,

	/// Base URL of the secrets engine (Vault-shaped).
	#[arg(long, env = "RENDERVANE_VAULT_ADDR")]
	vault_addr: Option<Url>,

	/// Bearer token for catalog requests.
	#[arg(long, env = "RENDERVANE_CONSUL_TOKEN")]
	consul_token: Option<String>,

	/// Token for secrets requests.
	#[arg(long, env = "RENDERVANE_VAULT_TOKEN")]
	vault_token: Option<String>,

	/// A `source:destination` pair; source is read from disk, destination is rendered to.
	/// May be repeated.
	#[arg(long = "template", value_name = "SOURCE:DEST", required = true)]
	templates: Vec<String>,

	/// Render once and exit instead of watching for further changes.
	#[arg(long)]
	once: bool,

	/// Report what would be rendered without writing any destination file.
	#[arg(long)]
	dry_run: bool,

	/// Maximum time to wait for new data between render passes.
	#[arg(long, value_parser = humantime_secs, default_value = "60")]
	max_wait: std::time::Duration,
}

fn humantime_secs(raw: &str) -> Result<std::time::Duration, String> {
	raw.parse::<u64>()
		.map(std::time::Duration::from_secs)
		.map_err(|err| err.to_string())
}

struct TemplateJob {
	template: Arc<Template>,
	renderer: FileRenderer,
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	let cli = Cli::parse();

	match run(cli).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			tracing::error!(%err, "rendervane exited with an error");
			ExitCode::FAILURE
		},
	}
}

async fn run(cli: Cli) -> rendervane::Result<()> {
	let watcher = build_watcher(&cli)?;
	let jobs = load_jobs(&cli)?;

	loop {
		let mut all_complete = true;

		for job in &jobs {
			let event = Resolver::run(&job.template, &watcher)?;
			all_complete &= event.complete;

			if !event.no_change {
				#[cfg(feature = "metrics")]
				let started = std::time::Instant::now();

				job.renderer.render(&event.contents)?;

				#[cfg(feature = "metrics")]
				rendervane::metrics::record_render_duration(job.template.id(), started.elapsed());
			}
		}

		if cli.once && all_complete {
			break;
		}

		watcher.wait(Some(cli.max_wait)).await?;
	}

	watcher.stop();

	Ok(())
}

fn build_watcher(cli: &Cli) -> rendervane::Result<Arc<Watcher>> {
	let mut builder = WatcherBuilder::new().event_handler(Arc::new(TracingEventHandler));

	if let (Some(consul), Some(vault)) = (&cli.consul_addr, &cli.vault_addr) {
		let mut clients = rendervane::dependency::clients::Clients::new(consul.clone(), vault.clone())?;

		if let Some(token) = &cli.consul_token {
			clients = clients.with_catalog_token(token.clone());
		}
		if let Some(token) = &cli.vault_token {
			clients = clients.with_secrets_token(token.clone());
		}

		builder = builder.clients(Arc::new(clients));
	}

	Ok(builder.build())
}

fn load_jobs(cli: &Cli) -> rendervane::Result<Vec<TemplateJob>> {
	cli.templates
		.iter()
		.map(|spec| {
			let (source, destination) = spec.split_once(':').ok_or_else(|| rendervane::Error::Validation {
				field: "template",
				reason: format!("expected SOURCE:DEST, got '{spec}'"),
			})?;

			let content = std::fs::read_to_string(source)?;
			let template = Arc::new(Template::with_name_and_engine(content, source, engine_with_builtins()));

			Ok(TemplateJob {
				template,
				renderer: FileRenderer::new(PathBuf::from(destination)).dry_run(cli.dry_run),
			})
		})
		.collect()
}

/// `key`, `keys`, `service`, and `secret` resolve straight to [`Dependency::Kv`] /
/// [`Dependency::KvList`] / [`Dependency::Catalog`] / [`Dependency::Secret`]; `env` is a
/// process-environment lookup that needs no dependency at all.
fn engine_with_builtins() -> Engine {
	Engine::new()
		.with_function(
			"key",
			Arc::new(|recaller, args| {
				let path = args.first().cloned().unwrap_or_default();
				Ok(recaller.recall(Dependency::Kv(KvQuery::new(path))).unwrap_or(Value::Null))
			}),
		)
		.with_function(
			"keys",
			Arc::new(|recaller, args| {
				let prefix = args.first().cloned().unwrap_or_default();
				Ok(recaller.recall(Dependency::KvList(KvQuery::new(prefix))).unwrap_or(Value::Null))
			}),
		)
		.with_function(
			"service",
			Arc::new(|recaller, args| {
				let name = args.first().cloned().unwrap_or_default();
				Ok(recaller.recall(Dependency::Catalog(CatalogQuery::new(name))).unwrap_or(Value::Null))
			}),
		)
		.with_function(
			"secret",
			Arc::new(|recaller, args| {
				let path = args.first().cloned().unwrap_or_default();
				Ok(recaller.recall(Dependency::Secret(SecretQuery::new(path))).unwrap_or(Value::Null))
			}),
		)
		.with_function(
			"env",
			Arc::new(|recaller, args| {
				let name = args.first().cloned().unwrap_or_default();
				let prefix = format!("{name}=");

				Ok(recaller
					.env()
					.iter()
					.find_map(|pair| pair.strip_prefix(&prefix))
					.map(|value| Value::String(value.to_owned()))
					.unwrap_or(Value::Null))
			}),
		)
}
