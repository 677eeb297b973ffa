//! Cached token snapshots and the renewal state machine evaluated on every lookup.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, ScopeSet, TokenSecret},
	config::RenewalPolicy,
	obs::RenewalKind,
};

/// Usability of a cached token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalState {
	/// No token was ever fetched for the key; the caller must fetch and wait.
	Empty,
	/// The token is valid and outside the renewal window.
	Fresh,
	/// The token is still valid but inside the renew-before-expiry window.
	EarlyRenewal,
	/// The token expired; the caller must fetch and wait.
	Expired,
	/// A previous fetch failed and the retry delay has not elapsed; no new fetch is allowed.
	RetryBackoff {
		/// Instant after which another fetch may start.
		retry_at: OffsetDateTime,
	},
}
impl RenewalState {
	/// Returns `true` when a caller cannot be served until a fetch succeeds.
	pub fn requires_fetch(self) -> bool {
		matches!(self, Self::Empty | Self::Expired)
	}
}

/// Immutable snapshot of one cached credential.
///
/// The cache never mutates a snapshot in place: renewals produce a new value through
/// [`Jwt::begin_renewal`], [`Jwt::renewed`], or [`Jwt::failed`] and the manager swaps it into the
/// cache. `generation` increases once per completed renewal attempt so a caller that waited on
/// another caller's fetch can tell that an outcome arrived while it was queued.
#[derive(Clone)]
pub struct Jwt {
	/// Key this snapshot is cached under.
	pub key: CacheKey,
	/// Bearer token; `None` until the first successful fetch.
	pub token: Option<TokenSecret>,
	/// Scopes granted by the issuer, when the token response listed them.
	pub scopes: Option<ScopeSet>,
	/// Absolute expiry decoded from the token; `None` means never fetched.
	pub expires_at: Option<OffsetDateTime>,
	/// Set while a renewal for this key is in flight.
	pub renewing: bool,
	/// No early renewal may start before this instant after an early renewal failed.
	pub early_retry_timeout: Option<OffsetDateTime>,
	/// No fetch may start before this instant after a blocking fetch failed.
	pub expired_retry_timeout: Option<OffsetDateTime>,
	/// Failure of the most recent renewal attempt, cleared on success.
	pub last_failure: Option<Error>,
	/// Number of completed renewal attempts.
	pub generation: u64,
}
impl Jwt {
	/// Creates the placeholder cached the first time a key is seen.
	pub fn empty(key: CacheKey) -> Self {
		Self {
			key,
			token: None,
			scopes: None,
			expires_at: None,
			renewing: false,
			early_retry_timeout: None,
			expired_retry_timeout: None,
			last_failure: None,
			generation: 0,
		}
	}

	/// Evaluates the renewal state at `now`.
	pub fn renewal_state(&self, now: OffsetDateTime, policy: &RenewalPolicy) -> RenewalState {
		let backoff = self
			.last_failure
			.as_ref()
			.and(self.expired_retry_timeout)
			.filter(|retry_at| now < *retry_at)
			.map(|retry_at| RenewalState::RetryBackoff { retry_at });
		let expires_at = match (self.token.as_ref(), self.expires_at) {
			(Some(_), Some(expires_at)) => expires_at,
			_ => return backoff.unwrap_or(RenewalState::Empty),
		};

		if now >= expires_at {
			return backoff.unwrap_or(RenewalState::Expired);
		}
		// A window reaching past the representable range covers the token's whole lifetime.
		if expires_at.checked_sub(policy.renew_before_expired).is_none_or(|start| now >= start) {
			return RenewalState::EarlyRenewal;
		}

		RenewalState::Fresh
	}

	/// Returns `true` once the early retry delay has elapsed (or none was ever set).
	pub fn early_renewal_allowed(&self, now: OffsetDateTime) -> bool {
		self.early_retry_timeout.is_none_or(|retry_at| now >= retry_at)
	}

	/// Returns `true` if the snapshot carries a token that has not expired at `now`.
	pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
		self.token.is_some() && self.expires_at.is_some_and(|expires_at| now < expires_at)
	}

	/// Returns the bearer token, if one was fetched.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.token.as_ref()
	}

	/// Granted scopes, or the empty set when the issuer did not list any.
	pub fn scopes_set(&self) -> ScopeSet {
		self.scopes.clone().unwrap_or_default()
	}

	/// Time left before expiry at `now`; zero once expired or never fetched.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at
			.map(|expires_at| expires_at - now)
			.filter(|left| left.is_positive())
			.unwrap_or(Duration::ZERO)
	}

	/// Copy of this snapshot marked as renewing.
	pub fn begin_renewal(&self) -> Self {
		Self { renewing: true, ..self.clone() }
	}

	/// Copy of this snapshot with the renewing flag cleared and nothing else changed.
	pub fn abandon_renewal(&self) -> Self {
		Self { renewing: false, ..self.clone() }
	}

	/// Snapshot after a successful renewal.
	pub fn renewed(
		&self,
		token: TokenSecret,
		expires_at: OffsetDateTime,
		scopes: Option<ScopeSet>,
	) -> Self {
		Self {
			key: self.key.clone(),
			token: Some(token),
			scopes,
			expires_at: Some(expires_at),
			renewing: false,
			early_retry_timeout: None,
			expired_retry_timeout: None,
			last_failure: None,
			generation: self.generation + 1,
		}
	}

	/// Snapshot after a failed renewal of the given kind.
	///
	/// Early renewals back off with `early_refresh_retry_delay` and keep the still-valid token;
	/// blocking renewals back off with `expired_refresh_retry_delay`.
	pub fn failed(
		&self,
		error: Error,
		now: OffsetDateTime,
		kind: RenewalKind,
		policy: &RenewalPolicy,
	) -> Self {
		let mut next = self.clone();

		next.renewing = false;
		next.last_failure = Some(error);
		next.generation += 1;

		match kind {
			RenewalKind::Early => {
				next.early_retry_timeout = Some(now.saturating_add(policy.early_refresh_retry_delay));
			},
			RenewalKind::Initial | RenewalKind::Expired => {
				next.expired_retry_timeout =
					Some(now.saturating_add(policy.expired_refresh_retry_delay));
			},
		}

		next
	}
}
impl Debug for Jwt {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Jwt")
			.field("key", &self.key)
			.field("token", &self.token.as_ref().map(|_| "<redacted>"))
			.field("scopes", &self.scopes)
			.field("expires_at", &self.expires_at)
			.field("renewing", &self.renewing)
			.field("early_retry_timeout", &self.early_retry_timeout)
			.field("expired_retry_timeout", &self.expired_retry_timeout)
			.field("last_failure", &self.last_failure)
			.field("generation", &self.generation)
			.finish()
	}
}
