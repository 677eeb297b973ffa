// self
use crate::obs::{RenewalKind, RenewalOutcome};

/// Records a renewal outcome via the global metrics recorder (when enabled).
pub fn record_renewal_outcome(kind: RenewalKind, outcome: RenewalOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_token_cache_renewal_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records one capacity eviction via the global metrics recorder (when enabled).
pub fn record_eviction() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_token_cache_eviction_total").increment(1);
	}
}
