// crates.io
use tracing::{Instrument, Span, instrument::Instrumented, span::EnteredSpan};
// self
use crate::{_prelude::*, auth::CacheKey, obs::RenewalKind};

/// Span wrapping one renewal of one cache key.
#[derive(Clone, Debug)]
pub struct RenewalSpan {
	span: Span,
}
impl RenewalSpan {
	/// Creates a span tagged with the renewal kind and the key being renewed.
	pub fn new(kind: RenewalKind, key: &CacheKey) -> Self {
		let span = tracing::info_span!(
			"oauth2_token_cache.renewal",
			kind = kind.as_str(),
			key = %key,
		);

		Self { span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> RenewalSpanGuard {
		RenewalSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments a future without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`RenewalSpan::entered`].
pub struct RenewalSpanGuard {
	_guard: EnteredSpan,
}
impl Debug for RenewalSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RenewalSpanGuard(..)")
	}
}
