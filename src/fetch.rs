//! Collaborator contracts the [`TokenManager`](crate::manager::TokenManager) renews through.
//!
//! A [`TokenFetcher`] performs the network round trip to the authorization server and an
//! [`ExpiryExtractor`] turns the returned token into an absolute expiry instant. Both are
//! consumed behind `Arc<dyn _>` so callers can plug in their own transports or token formats.

pub mod expiry;

pub use expiry::JwtExpiryExtractor;

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, ScopeSet, ServiceId, TokenSecret},
	error::DecodeError,
};

/// Boxed future returned by [`TokenFetcher`] implementations.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Obtains fresh tokens from the authorization server.
///
/// Implementations own their timeouts; the manager never cancels or times out a fetch on its own.
pub trait TokenFetcher
where
	Self: Send + Sync,
{
	/// Requests a token for `request`.
	fn fetch<'a>(&'a self, request: &'a TokenRequest) -> FetchFuture<'a, TokenResponse>;
}
impl<T> TokenFetcher for Arc<T>
where
	T: ?Sized + TokenFetcher,
{
	fn fetch<'a>(&'a self, request: &'a TokenRequest) -> FetchFuture<'a, TokenResponse> {
		(**self).fetch(request)
	}
}

/// Parameters of one token fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Cache key the resulting token will be stored under.
	pub key: CacheKey,
	/// Scopes to request: the key's scopes, or the configured defaults when the key has none.
	pub scope: ScopeSet,
}
impl TokenRequest {
	/// Builds the request for `key`, falling back to `default_scopes` for scope-less keys.
	pub fn for_key(key: &CacheKey, default_scopes: &ScopeSet) -> Self {
		let scope = if key.scopes.is_empty() { default_scopes.clone() } else { key.scopes.clone() };

		Self { key: key.clone(), scope }
	}

	/// Service the token is requested for, if any.
	pub fn service_id(&self) -> Option<&ServiceId> {
		self.key.service_id.as_ref()
	}
}

/// Token endpoint response body.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
	/// Issued bearer token.
	pub access_token: TokenSecret,
	/// Token type, normally `bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime in seconds as reported by the issuer; informational only.
	#[serde(default)]
	pub expires_in: Option<u64>,
	/// Space-delimited scopes granted by the issuer.
	#[serde(default)]
	pub scope: Option<String>,
}
impl TokenResponse {
	/// Creates a response carrying only a token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			token_type: None,
			expires_in: None,
			scope: None,
		}
	}

	/// Sets the granted scope string.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Parses the granted scopes; `None` when the issuer did not list any or listed invalid ones.
	pub fn granted_scopes(&self) -> Option<ScopeSet> {
		let raw = self.scope.as_deref()?;

		match ScopeSet::from_str(raw) {
			Ok(scopes) if !scopes.is_empty() => Some(scopes),
			Ok(_) => None,
			Err(e) => {
				tracing::debug!(error = %e, "ignoring unparsable granted scope");

				None
			},
		}
	}
}

/// Decodes the absolute expiry embedded in a fetched token.
pub trait ExpiryExtractor
where
	Self: Send + Sync,
{
	/// Returns the instant after which `token` is no longer valid.
	fn expires_at(&self, token: &str) -> Result<OffsetDateTime, DecodeError>;
}
impl<F> ExpiryExtractor for F
where
	F: Send + Sync + Fn(&str) -> Result<OffsetDateTime, DecodeError>,
{
	fn expires_at(&self, token: &str) -> Result<OffsetDateTime, DecodeError> {
		self(token)
	}
}
