//! Metadata returned alongside a fetched dependency value.

use crate::_prelude::*;

/// Source-reported metadata accompanying a successful or blocking [`super::Dependency::fetch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
	/// Monotonic version token reported by the source (a Consul `X-Consul-Index`, a Vault lease
	/// version, or similar). Used to detect "nothing changed" and source resets.
	pub last_index: u64,
	/// How long ago the source itself last had contact with its own backing store; used to
	/// decide whether a stale read has exceeded the configured `max_stale` budget.
	pub last_contact: Duration,
}
impl Metadata {
	/// Construct metadata for a source that just made direct contact (`last_contact` is zero).
	pub fn fresh(last_index: u64) -> Self {
		Self { last_index, last_contact: Duration::ZERO }
	}
}
