//! Observability helpers for token renewals.
//!
//! # Feature Flags
//!
//! - Spans named `oauth2_token_cache.renewal` carry the `kind` (initial/early/expired) and `key`
//!   fields and are always emitted through `tracing`.
//! - Enable `metrics` to increment `oauth2_token_cache_renewal_total` for every
//!   attempt/success/failure, labeled by `kind` + `outcome`, and
//!   `oauth2_token_cache_eviction_total` whenever the cache sacrifices an entry.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Why a renewal was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalKind {
	/// First fetch for a key that never held a token.
	Initial,
	/// Pre-emptive renewal inside the renew-before-expiry window.
	Early,
	/// Blocking renewal of an expired token.
	Expired,
}
impl RenewalKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalKind::Initial => "initial",
			RenewalKind::Early => "early",
			RenewalKind::Expired => "expired",
		}
	}

	/// Returns `true` when the caller cannot be served until the renewal finishes.
	pub const fn is_blocking(self) -> bool {
		!matches!(self, RenewalKind::Early)
	}
}
impl Display for RenewalKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each renewal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalOutcome {
	/// The fetcher was invoked.
	Attempt,
	/// A new token was cached.
	Success,
	/// The fetcher or expiry extractor failed.
	Failure,
}
impl RenewalOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalOutcome::Attempt => "attempt",
			RenewalOutcome::Success => "success",
			RenewalOutcome::Failure => "failure",
		}
	}
}
impl Display for RenewalOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
