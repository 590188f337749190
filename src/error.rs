//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the rendervane crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Dependency '{0}' was stopped before its fetch completed.")]
	Stopped(String),
	#[error("Dependency fetch timed out for '{0}'.")]
	Timeout(String),
	#[error("Upstream error for '{id}': {reason}")]
	Upstream { id: String, reason: String },

	#[error("Notifier '{0}' is already registered.")]
	DuplicateNotifier(String),

	#[error("Template parse error: {0}")]
	TemplateParse(String),
	#[error("Template execution error: {0}")]
	TemplateExecute(String),
	#[error("Missing value for key '{0}' and the missing-key policy is set to error.")]
	MissingKey(String),

	#[error("Render error: {0}")]
	Render(String),

	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },

	#[error("Metrics error: {0}")]
	Metrics(String),
}
#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}

/// Sentinel returned at the resolver boundary when a template had no new dependency data and the
/// previously cached output was returned unchanged. Not folded into [`Error`] since it isn't a
/// failure.
#[derive(Debug)]
pub struct ErrNoNewValues;
