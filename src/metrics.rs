//! Metrics helpers for the reactive engine: view polls, cache hits, retries, and buffer-timer
//! firings (spec §9 observability).

// crates.io
use metrics::Label;
use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_VIEW_POLLS_TOTAL: &str = "rendervane_view_polls_total";
const METRIC_VIEW_ERRORS_TOTAL: &str = "rendervane_view_errors_total";
const METRIC_VIEW_RETRIES_TOTAL: &str = "rendervane_view_retries_total";
const METRIC_CACHE_HITS_TOTAL: &str = "rendervane_cache_hits_total";
const METRIC_CACHE_MISSES_TOTAL: &str = "rendervane_cache_misses_total";
const METRIC_BUFFER_FIRED_TOTAL: &str = "rendervane_buffer_fired_total";
const METRIC_RENDER_DURATION: &str = "rendervane_render_duration_seconds";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a completed poll of a dependency's view, successful or not.
pub fn record_view_poll(dependency_id: &str, success: bool) {
	let labels = dependency_labels(dependency_id);

	metrics::counter!(METRIC_VIEW_POLLS_TOTAL, labels.iter()).increment(1);

	if !success {
		metrics::counter!(METRIC_VIEW_ERRORS_TOTAL, labels.iter()).increment(1);
	}
}

/// Record a retry attempt after a failed poll.
pub fn record_view_retry(dependency_id: &str) {
	metrics::counter!(METRIC_VIEW_RETRIES_TOTAL, dependency_labels(dependency_id).iter())
		.increment(1);
}

/// Record a cache lookup, tagging whether the value was already present.
pub fn record_cache_lookup(dependency_id: &str, hit: bool) {
	let labels = dependency_labels(dependency_id);

	if hit {
		metrics::counter!(METRIC_CACHE_HITS_TOTAL, labels.iter()).increment(1);
	} else {
		metrics::counter!(METRIC_CACHE_MISSES_TOTAL, labels.iter()).increment(1);
	}
}

/// Record a buffer-period timer firing for a template.
pub fn record_buffer_fired(template_id: &str) {
	metrics::counter!(METRIC_BUFFER_FIRED_TOTAL, template_labels(template_id).iter()).increment(1);
}

/// Record how long a render pass took for a template.
pub fn record_render_duration(template_id: &str, duration: Duration) {
	metrics::histogram!(METRIC_RENDER_DURATION, template_labels(template_id).iter())
		.record(duration.as_secs_f64());
}

fn dependency_labels(dependency_id: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("dependency", dependency_id.to_owned()));

	labels
}

fn template_labels(template_id: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("template", template_id.to_owned()));

	labels
}
