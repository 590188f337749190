//! The view's retry policy: `retries → (shouldRetry, sleep)` (spec §4.1, §7).

use crate::_prelude::*;

/// Outcome of consulting a [`RetryPolicy`] after a transient fetch failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Retry after sleeping the given duration.
	Retry(Duration),
	/// Give up; the view should emit `MaxRetries` and surface the error.
	GiveUp,
}

/// Decides whether a [`crate::view::View`] should retry a failed fetch, and how long to wait
/// first. Implementations receive the number of retries already attempted for the current fetch
/// attempt (reset to zero after every successful contact).
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
	/// Consult the policy for the next retry decision.
	fn next(&self, retries: u32) -> RetryDecision;
}

/// Exponential backoff with a retry ceiling, the default policy used by [`crate::Watcher`].
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
	/// Maximum number of retries before giving up.
	pub max_retries: u32,
	/// Base delay before the first retry.
	pub base: Duration,
	/// Ceiling applied to the exponential growth.
	pub max: Duration,
}
impl ExponentialBackoff {
	/// Build a backoff policy with the given bounds.
	pub fn new(max_retries: u32, base: Duration, max: Duration) -> Self {
		Self { max_retries, base, max }
	}
}
impl Default for ExponentialBackoff {
	fn default() -> Self {
		Self { max_retries: 5, base: Duration::from_millis(250), max: Duration::from_secs(60) }
	}
}
impl RetryPolicy for ExponentialBackoff {
	fn next(&self, retries: u32) -> RetryDecision {
		if retries >= self.max_retries {
			return RetryDecision::GiveUp;
		}

		let exponent = retries.min(16);
		let delay = self.base.saturating_mul(1u32 << exponent).min(self.max);

		RetryDecision::Retry(delay)
	}
}

/// A policy that never retries; every transient error gives up immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;
impl RetryPolicy for NoRetry {
	fn next(&self, _retries: u32) -> RetryDecision {
		RetryDecision::GiveUp
	}
}
