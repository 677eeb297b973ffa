//! Token manager: resolve-or-create, renewal decisions, and singleflight fetches per cache key.
//!
//! [`TokenManager::get_token`] is the single entry point. It resolves (or creates) the cached
//! [`Jwt`] under a short critical section, evaluates the entry's [`RenewalState`], and only then
//! talks to the [`TokenFetcher`]. Renewals for one key are serialized by a per-key async guard:
//! blocking renewals (empty or expired tokens) queue on it and reuse whatever outcome the caller
//! ahead of them produced, while early renewals only proceed when the guard is free so other
//! callers keep receiving the still-valid token.

mod metrics;

pub use metrics::RenewalMetrics;

// std
use std::sync::OnceLock;
// self
use crate::{
	_prelude::*,
	auth::{CacheKey, Jwt, RenewalState, ScopeSet, ServiceId},
	cache::{CacheStrategy, LongestExpireCacheStrategy, longest_expire::DEFAULT_CAPACITY},
	clock::{Clock, SystemClock},
	config::RenewalPolicy,
	error::{DecodeError, FetchError},
	fetch::{ExpiryExtractor, JwtExpiryExtractor, TokenFetcher, TokenRequest},
	obs::{self, RenewalKind, RenewalOutcome, RenewalSpan},
};
#[cfg(feature = "reqwest")]
use crate::{config::ClientConfig, http::ReqwestTokenFetcher};

type RenewalGuards = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

static GLOBAL: OnceLock<Arc<TokenManager>> = OnceLock::new();

/// Caches tokens per [`CacheKey`] and renews them through a [`TokenFetcher`].
pub struct TokenManager {
	cache: Arc<dyn CacheStrategy>,
	fetcher: Arc<dyn TokenFetcher>,
	extractor: Arc<dyn ExpiryExtractor>,
	clock: Arc<dyn Clock>,
	policy: RenewalPolicy,
	default_scopes: ScopeSet,
	metrics: RenewalMetrics,
	entry_lock: Mutex<()>,
	renewal_guards: RenewalGuards,
}
impl TokenManager {
	/// Starts a builder around `fetcher` with default policy, capacity, extractor, and clock.
	pub fn builder<F>(fetcher: F) -> TokenManagerBuilder
	where
		F: 'static + TokenFetcher,
	{
		TokenManagerBuilder::new(Arc::new(fetcher))
	}

	/// Builds a manager backed by [`ReqwestTokenFetcher`] from a client configuration.
	///
	/// Renewal timings, cache capacity, and default scopes are read once here.
	#[cfg(feature = "reqwest")]
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let fetcher = ReqwestTokenFetcher::from_config(config)?;
		let default_scopes = fetcher.credentials().default_scopes.clone();

		Ok(Self::builder(fetcher)
			.with_policy(config.renewal_policy())
			.with_capacity(config.cache_capacity())
			.with_default_scopes(default_scopes)
			.build())
	}

	/// Installs the process-wide manager. Returns the rejected manager if one is already installed.
	pub fn install_global(manager: Arc<Self>) -> Result<(), Arc<Self>> {
		GLOBAL.set(manager)
	}

	/// Returns the process-wide manager, if one was installed.
	pub fn global() -> Option<Arc<Self>> {
		GLOBAL.get().cloned()
	}

	/// Returns the process-wide manager, creating it with `init` on first use.
	pub fn get_or_init_global<F>(init: F) -> Arc<Self>
	where
		F: FnOnce() -> Self,
	{
		GLOBAL.get_or_init(|| Arc::new(init())).clone()
	}

	/// Renewal timings this manager was built with.
	pub fn policy(&self) -> &RenewalPolicy {
		&self.policy
	}

	/// Lookup and renewal counters.
	pub fn metrics(&self) -> &RenewalMetrics {
		&self.metrics
	}

	/// Returns the cached snapshot for `key` without creating or renewing it.
	pub fn cached(&self, key: &CacheKey) -> Option<Jwt> {
		self.cache.get(key)
	}

	/// Drops the cached entry for `key` so the next lookup fetches again.
	pub fn invalidate(&self, key: &CacheKey) -> Option<Jwt> {
		let _section = self.entry_lock.lock();

		self.cache.remove(key)
	}

	/// Returns the token for the default, unscoped key.
	pub async fn get_default_token(&self) -> Result<Jwt> {
		self.get_token(&CacheKey::default()).await
	}

	/// Returns the token for scopes or a service id; scopes win when both are given.
	pub async fn get_token_for(
		&self,
		scopes: Option<ScopeSet>,
		service_id: Option<ServiceId>,
	) -> Result<Jwt> {
		self.get_token(&CacheKey::from_parts(scopes, service_id)).await
	}

	/// Returns a usable token for `key`, fetching or renewing it when required.
	///
	/// The returned snapshot always carries a token that has not expired at the time of the
	/// decision. Fetch failures are recorded on the entry (starting a retry backoff) and returned
	/// to the caller.
	pub async fn get_token(&self, key: &CacheKey) -> Result<Jwt> {
		let entry = self.resolve(key);
		let now = self.clock.now();

		match entry.renewal_state(now, &self.policy) {
			RenewalState::Fresh => {
				self.metrics.record_hit();

				Ok(entry)
			},
			RenewalState::RetryBackoff { retry_at } => {
				tracing::debug!(%key, %retry_at, "token renewal is backing off");

				Err(Self::replay_failure(&entry, retry_at))
			},
			RenewalState::EarlyRenewal => {
				if entry.renewing || !entry.early_renewal_allowed(now) {
					self.metrics.record_hit();

					return Ok(entry);
				}

				let guard = self.renewal_guard(key);
				let Some(_singleflight) = guard.try_lock() else {
					self.metrics.record_hit();

					return Ok(entry);
				};

				self.settle(key, entry.generation).await
			},
			RenewalState::Empty | RenewalState::Expired => {
				let guard = self.renewal_guard(key);
				let _singleflight = guard.lock().await;

				self.settle(key, entry.generation).await
			},
		}
	}

	/// Fetches the entry for `key`, inserting an empty one on first sight.
	fn resolve(&self, key: &CacheKey) -> Jwt {
		let _section = self.entry_lock.lock();

		if let Some(entry) = self.cache.get(key) {
			return entry;
		}

		let entry = Jwt::empty(key.clone());

		self.cache.put(key.clone(), entry.clone());
		tracing::debug!(%key, "created empty cache entry");

		entry
	}

	fn commit(&self, entry: Jwt) {
		let _section = self.entry_lock.lock();

		self.cache.put(entry.key.clone(), entry);
	}

	fn renewal_guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.renewal_guards.lock();

		if guards.len() > self.cache.capacity().saturating_mul(2) {
			guards.retain(|_, guard| Arc::strong_count(guard) > 1);
		}

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Re-evaluates `key` while holding its renewal guard and renews if still required.
	///
	/// `seen_generation` is the entry generation observed before queuing on the guard; a newer
	/// generation means another caller finished a renewal in the meantime and its outcome is
	/// reused instead of fetching again.
	async fn settle(&self, key: &CacheKey, seen_generation: u64) -> Result<Jwt> {
		let current = self.resolve(key);
		let now = self.clock.now();

		if current.generation != seen_generation {
			if current.is_usable_at(now) {
				self.metrics.record_hit();

				return Ok(current);
			}
			if let Some(failure) = &current.last_failure {
				return Err(failure.clone());
			}
		}

		match current.renewal_state(now, &self.policy) {
			RenewalState::Fresh => Ok(current),
			RenewalState::EarlyRenewal if !current.early_renewal_allowed(now) => Ok(current),
			RenewalState::EarlyRenewal => self.renew(current, RenewalKind::Early).await,
			RenewalState::Empty => self.renew(current, RenewalKind::Initial).await,
			RenewalState::Expired => self.renew(current, RenewalKind::Expired).await,
			RenewalState::RetryBackoff { retry_at } => Err(Self::replay_failure(&current, retry_at)),
		}
	}

	async fn renew(&self, current: Jwt, kind: RenewalKind) -> Result<Jwt> {
		let span = RenewalSpan::new(kind, &current.key);
		let request = TokenRequest::for_key(&current.key, &self.default_scopes);

		obs::record_renewal_outcome(kind, RenewalOutcome::Attempt);
		self.metrics.record_attempt();
		self.commit(current.begin_renewal());

		let mut reset = RenewingReset { manager: self, key: &current.key, armed: true };
		let fetched = span
			.instrument(async {
				let response = self.fetcher.fetch(&request).await?;
				let expires_at = self.extractor.expires_at(response.access_token.expose())?;

				if expires_at <= self.clock.now() {
					return Err(Error::from(DecodeError::AlreadyExpired { expires_at }));
				}

				Ok::<_, Error>((response, expires_at))
			})
			.await;

		reset.armed = false;

		let now = self.clock.now();

		match fetched {
			Ok((response, expires_at)) => {
				let scopes = response.granted_scopes();
				let renewed = current.renewed(response.access_token, expires_at, scopes);

				self.commit(renewed.clone());
				self.metrics.record_success();
				obs::record_renewal_outcome(kind, RenewalOutcome::Success);
				tracing::debug!(key = %current.key, %kind, %expires_at, "token renewed");

				Ok(renewed)
			},
			Err(e) => {
				let failed = current.failed(e.clone(), now, kind, &self.policy);

				self.commit(failed.clone());
				self.metrics.record_failure();
				obs::record_renewal_outcome(kind, RenewalOutcome::Failure);
				tracing::warn!(
					key = %current.key,
					%kind,
					code = e.code(),
					error = %e,
					"token renewal failed"
				);

				if !kind.is_blocking() && failed.is_usable_at(now) { Ok(failed) } else { Err(e) }
			},
		}
	}

	fn replay_failure(entry: &Jwt, retry_at: OffsetDateTime) -> Error {
		entry.last_failure.clone().unwrap_or_else(|| {
			FetchError::TokenEndpoint {
				status: None,
				message: format!("token renewal is backing off until {retry_at}"),
			}
			.into()
		})
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("policy", &self.policy)
			.field("default_scopes", &self.default_scopes)
			.field("cached", &self.cache.len())
			.field("capacity", &self.cache.capacity())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Builder for [`TokenManager`].
pub struct TokenManagerBuilder {
	fetcher: Arc<dyn TokenFetcher>,
	cache: Option<Arc<dyn CacheStrategy>>,
	capacity: usize,
	extractor: Arc<dyn ExpiryExtractor>,
	clock: Arc<dyn Clock>,
	policy: RenewalPolicy,
	default_scopes: ScopeSet,
}
impl TokenManagerBuilder {
	/// Creates a builder around a shared fetcher.
	pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
		Self {
			fetcher,
			cache: None,
			capacity: DEFAULT_CAPACITY,
			extractor: Arc::new(JwtExpiryExtractor),
			clock: Arc::new(SystemClock),
			policy: RenewalPolicy::default(),
			default_scopes: ScopeSet::default(),
		}
	}

	/// Overrides the renewal timings.
	pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Sets the capacity of the default [`LongestExpireCacheStrategy`].
	///
	/// Ignored when a custom cache is supplied through [`with_cache`](Self::with_cache).
	pub fn with_capacity(mut self, capacity: usize) -> Self {
		self.capacity = capacity;

		self
	}

	/// Replaces the cache strategy.
	pub fn with_cache(mut self, cache: Arc<dyn CacheStrategy>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Replaces the expiry extractor (defaults to [`JwtExpiryExtractor`]).
	pub fn with_extractor<E>(mut self, extractor: E) -> Self
	where
		E: 'static + ExpiryExtractor,
	{
		self.extractor = Arc::new(extractor);

		self
	}

	/// Replaces the clock (defaults to [`SystemClock`]).
	pub fn with_clock<C>(mut self, clock: C) -> Self
	where
		C: 'static + Clock,
	{
		self.clock = Arc::new(clock);

		self
	}

	/// Scopes requested for keys that carry none.
	pub fn with_default_scopes(mut self, scopes: ScopeSet) -> Self {
		self.default_scopes = scopes;

		self
	}

	/// Finalizes the manager.
	pub fn build(self) -> TokenManager {
		let cache = self
			.cache
			.unwrap_or_else(|| Arc::new(LongestExpireCacheStrategy::new(self.capacity)));

		TokenManager {
			cache,
			fetcher: self.fetcher,
			extractor: self.extractor,
			clock: self.clock,
			policy: self.policy,
			default_scopes: self.default_scopes,
			metrics: Default::default(),
			entry_lock: Mutex::new(()),
			renewal_guards: Default::default(),
		}
	}
}
impl Debug for TokenManagerBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManagerBuilder")
			.field("custom_cache", &self.cache.is_some())
			.field("capacity", &self.capacity)
			.field("policy", &self.policy)
			.field("default_scopes", &self.default_scopes)
			.finish()
	}
}

/// Clears the entry's `renewing` flag if a renewal future is dropped mid-fetch.
struct RenewingReset<'a> {
	manager: &'a TokenManager,
	key: &'a CacheKey,
	armed: bool,
}
impl Drop for RenewingReset<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let _section = self.manager.entry_lock.lock();

		if let Some(entry) = self.manager.cache.get(self.key).filter(|entry| entry.renewing) {
			self.manager.cache.put(self.key.clone(), entry.abandon_renewal());
			tracing::debug!(key = %self.key, "renewal abandoned");
		}
	}
}
