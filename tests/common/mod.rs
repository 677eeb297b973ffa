//! Shared fixtures for the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	str::FromStr,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::{OffsetDateTime, macros};
// self
use oauth2_token_cache::{
	CacheKey, Error, ScopeSet, TokenManager, TokenManagerBuilder,
	clock::ManualClock,
	error::{DecodeError, FetchError},
	fetch::{FetchFuture, TokenFetcher, TokenRequest, TokenResponse},
};

pub const T0: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

type Expiries = Arc<Mutex<HashMap<String, OffsetDateTime>>>;

/// Fetcher that replays queued outcomes and counts invocations.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
	script: Arc<Mutex<VecDeque<Result<TokenResponse, Error>>>>,
	expiries: Expiries,
	requests: Arc<Mutex<Vec<TokenRequest>>>,
	calls: Arc<AtomicUsize>,
	delay: Option<StdDuration>,
}
impl ScriptedFetcher {
	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = Some(delay);

		self
	}

	/// Queues a successful response whose token expires at `expires_at`.
	pub fn issue(&self, token: &str, expires_at: OffsetDateTime) -> &Self {
		self.expiries.lock().insert(token.to_owned(), expires_at);
		self.script.lock().push_back(Ok(TokenResponse::new(token)));

		self
	}

	/// Queues a successful response whose token carries no decodable expiry.
	pub fn issue_undecodable(&self, token: &str) -> &Self {
		self.script.lock().push_back(Ok(TokenResponse::new(token)));

		self
	}

	/// Queues a token endpoint failure.
	pub fn reject(&self, status: u16) -> &Self {
		let message = format!("status {status}");
		let err = FetchError::TokenEndpoint { status: Some(status), message };

		self.script.lock().push_back(Err(err.into()));

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<TokenRequest> {
		self.requests.lock().clone()
	}

	/// Extractor resolving expiries registered through [`ScriptedFetcher::issue`].
	pub fn extractor(&self) -> impl Fn(&str) -> Result<OffsetDateTime, DecodeError> + use<> {
		let expiries = self.expiries.clone();

		move |token: &str| expiries.lock().get(token).copied().ok_or(DecodeError::MissingExpiry)
	}
}
impl TokenFetcher for ScriptedFetcher {
	fn fetch<'a>(&'a self, request: &'a TokenRequest) -> FetchFuture<'a, TokenResponse> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.requests.lock().push(request.clone());

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			self.script.lock().pop_front().unwrap_or_else(|| {
				Err(FetchError::TokenEndpoint { status: None, message: "script exhausted".into() }
					.into())
			})
		})
	}
}

pub fn scopes(raw: &str) -> ScopeSet {
	ScopeSet::from_str(raw).expect("Scope fixture should parse.")
}

pub fn key(raw: &str) -> CacheKey {
	CacheKey::for_scopes(scopes(raw))
}

/// Builder wired to a scripted fetcher and a manual clock at [`T0`].
pub fn builder(fetcher: &ScriptedFetcher, clock: &ManualClock) -> TokenManagerBuilder {
	TokenManager::builder(fetcher.clone())
		.with_extractor(fetcher.extractor())
		.with_clock(clock.clone())
}

pub fn manager(fetcher: &ScriptedFetcher) -> (TokenManager, ManualClock) {
	let clock = ManualClock::new(T0);

	(builder(fetcher, &clock).build(), clock)
}

pub fn token_of(jwt: &oauth2_token_cache::Jwt) -> &str {
	jwt.access_token().expect("Snapshot should carry a token.").expose()
}
