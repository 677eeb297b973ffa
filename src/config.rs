//! `client.yml`/`client.json` configuration model and the renewal policy derived from it.
//!
//! Only the sections the token cache consumes are modeled: `request.timeout`, the
//! `oauth.token` section (renewal timings, cache capacity, client credentials, token key endpoint),
//! and the `oauth.sign.key` endpoint. Values are read once; a manager built from a config never
//! observes later edits.

// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ServiceId},
	cache::longest_expire::DEFAULT_CAPACITY,
	error::ConfigError,
};

const DEFAULT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_RENEW_BEFORE_EXPIRED_MS: u64 = 60_000;
const DEFAULT_EXPIRED_REFRESH_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_EARLY_REFRESH_RETRY_DELAY_MS: u64 = 4_000;

/// Renewal timings applied by the [`TokenManager`](crate::manager::TokenManager).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalPolicy {
	/// Window before expiry in which a token is renewed early.
	pub renew_before_expired: Duration,
	/// Backoff after a failed fetch for an empty or expired token.
	pub expired_refresh_retry_delay: Duration,
	/// Backoff after a failed early renewal.
	pub early_refresh_retry_delay: Duration,
}
impl RenewalPolicy {
	/// Overrides the renew-before-expiry window; negative values clamp to zero.
	pub fn with_renew_before_expired(mut self, window: Duration) -> Self {
		self.renew_before_expired = clamp(window);

		self
	}

	/// Overrides the backoff after a failed blocking fetch; negative values clamp to zero.
	pub fn with_expired_refresh_retry_delay(mut self, delay: Duration) -> Self {
		self.expired_refresh_retry_delay = clamp(delay);

		self
	}

	/// Overrides the backoff after a failed early renewal; negative values clamp to zero.
	pub fn with_early_refresh_retry_delay(mut self, delay: Duration) -> Self {
		self.early_refresh_retry_delay = clamp(delay);

		self
	}
}
impl Default for RenewalPolicy {
	fn default() -> Self {
		Self {
			renew_before_expired: millis(DEFAULT_RENEW_BEFORE_EXPIRED_MS),
			expired_refresh_retry_delay: millis(DEFAULT_EXPIRED_REFRESH_RETRY_DELAY_MS),
			early_refresh_retry_delay: millis(DEFAULT_EARLY_REFRESH_RETRY_DELAY_MS),
		}
	}
}

/// Root of the client configuration document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ClientConfig {
	/// Outbound request settings.
	#[serde(default)]
	pub request: RequestConfig,
	/// OAuth settings; absent when the service calls no protected endpoints.
	#[serde(default)]
	pub oauth: Option<OAuthConfig>,
}
impl ClientConfig {
	/// Parses a JSON document.
	pub fn from_json_str(raw: &str) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de).map_err(|e| parse_error(e.path(), e.inner()))
	}

	/// Parses a YAML document.
	pub fn from_yaml_str(raw: &str) -> Result<Self> {
		let de = serde_yaml::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de).map_err(|e| parse_error(e.path(), e.inner()))
	}

	/// Reads a file, choosing JSON for `.json` and YAML otherwise.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			file: path.display().to_string(),
			source: Arc::new(source),
		})?;

		match path.extension().and_then(|ext| ext.to_str()) {
			Some("json") => Self::from_json_str(&raw),
			_ => Self::from_yaml_str(&raw),
		}
	}

	/// The `oauth.token` section, logging when it is absent.
	pub fn token_config(&self) -> Option<&OAuthTokenConfig> {
		let token = self.oauth.as_ref().and_then(|oauth| oauth.token.as_ref());

		if token.is_none() {
			tracing::error!(
				code = Error::CONFIG_PROPERTY_MISSING,
				section = "oauth.token",
				"token configuration is missing; defaults apply"
			);
		}

		token
	}

	/// Renewal timings from `oauth.token`, falling back to defaults per missing value.
	pub fn renewal_policy(&self) -> RenewalPolicy {
		let defaults = RenewalPolicy::default();
		let Some(token) = self.oauth.as_ref().and_then(|oauth| oauth.token.as_ref()) else {
			return defaults;
		};

		RenewalPolicy {
			renew_before_expired: token
				.token_renew_before_expired
				.map(millis)
				.unwrap_or(defaults.renew_before_expired),
			expired_refresh_retry_delay: token
				.expired_refresh_retry_delay
				.map(millis)
				.unwrap_or(defaults.expired_refresh_retry_delay),
			early_refresh_retry_delay: token
				.early_refresh_retry_delay
				.map(millis)
				.unwrap_or(defaults.early_refresh_retry_delay),
		}
	}

	/// Cache capacity from `oauth.token.cache.capacity` (default 200).
	pub fn cache_capacity(&self) -> usize {
		self.oauth
			.as_ref()
			.and_then(|oauth| oauth.token.as_ref())
			.and_then(|token| token.cache.as_ref())
			.and_then(|cache| cache.capacity)
			.unwrap_or(DEFAULT_CAPACITY)
	}

	/// Request timeout applied to every call against the authorization server.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.request.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))
	}

	/// Resolves the client credentials grant settings.
	///
	/// `server_url`, `client_credentials.uri`, and `client_credentials.client_id` are required. A
	/// missing `client_secret` is logged and resolves to `None` so public clients still work.
	pub fn client_credentials(&self) -> Result<ClientCredentials> {
		let token = self.token_config().ok_or_else(|| ConfigError::missing("oauth.token"))?;
		let grant = token
			.client_credentials
			.as_ref()
			.ok_or_else(|| ConfigError::missing("oauth.token.client_credentials"))?;
		let server_url = token
			.server_url
			.as_ref()
			.ok_or_else(|| ConfigError::missing("oauth.token.server_url"))?;
		let uri = grant
			.uri
			.as_deref()
			.ok_or_else(|| ConfigError::missing("oauth.token.client_credentials.uri"))?;
		let client_id = grant
			.client_id
			.clone()
			.ok_or_else(|| ConfigError::missing("oauth.token.client_credentials.client_id"))?;

		if grant.client_secret.is_none() {
			tracing::error!(
				code = Error::CONFIG_PROPERTY_MISSING,
				section = "oauth.token.client_credentials.client_secret",
				"client secret is missing; continuing without one"
			);
		}

		Ok(ClientCredentials {
			token_url: join_url(server_url, uri, "oauth.token.client_credentials.uri")?,
			client_id,
			client_secret: grant.client_secret.clone(),
			default_scopes: grant.scope.clone().unwrap_or_default(),
			service_id: token.service_id.clone(),
		})
	}

	/// Resolves the endpoint serving keys for the given purpose.
	pub fn key_endpoint(&self, purpose: KeyPurpose) -> Result<KeyEndpoint> {
		let oauth = self.oauth.as_ref().ok_or_else(|| ConfigError::missing("oauth"))?;
		let (section, key) = match purpose {
			KeyPurpose::TokenVerification => (
				"oauth.token.key",
				oauth.token.as_ref().and_then(|token| token.key.as_ref()),
			),
			KeyPurpose::Signing =>
				("oauth.sign.key", oauth.sign.as_ref().and_then(|sign| sign.key.as_ref())),
		};
		let key = key.ok_or_else(|| {
			tracing::error!(code = Error::CONFIG_PROPERTY_MISSING, section, "key section is missing");

			ConfigError::missing(section)
		})?;
		let server_url = key
			.server_url
			.as_ref()
			.ok_or_else(|| ConfigError::missing(format!("{section}.server_url")))?;
		let uri = key.uri.as_deref().ok_or_else(|| ConfigError::missing(format!("{section}.uri")))?;

		Ok(KeyEndpoint {
			url: join_url(server_url, uri, section)?,
			client_id: key.client_id.clone(),
			client_secret: key.client_secret.clone(),
		})
	}
}

/// The `request` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RequestConfig {
	/// Request timeout in milliseconds (default 3000).
	#[serde(default)]
	pub timeout: Option<u64>,
}

/// The `oauth` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthConfig {
	/// The `oauth.token` section.
	#[serde(default)]
	pub token: Option<OAuthTokenConfig>,
	/// The `oauth.sign` section.
	#[serde(default)]
	pub sign: Option<OAuthSignConfig>,
}

/// The `oauth.token` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthTokenConfig {
	/// Cache sizing.
	#[serde(default)]
	pub cache: Option<CacheConfig>,
	/// Renew-before-expiry window in milliseconds.
	#[serde(default, rename = "tokenRenewBeforeExpired")]
	pub token_renew_before_expired: Option<u64>,
	/// Backoff in milliseconds after a failed fetch of an expired token.
	#[serde(default, rename = "expiredRefreshRetryDelay")]
	pub expired_refresh_retry_delay: Option<u64>,
	/// Backoff in milliseconds after a failed early renewal.
	#[serde(default, rename = "earlyRefreshRetryDelay")]
	pub early_refresh_retry_delay: Option<u64>,
	/// Base URL of the authorization server.
	#[serde(default)]
	pub server_url: Option<Url>,
	/// Service id of the authorization server, when resolved through discovery.
	#[serde(default, rename = "serviceId")]
	pub service_id: Option<ServiceId>,
	/// Client credentials grant settings.
	#[serde(default)]
	pub client_credentials: Option<GrantConfig>,
	/// Token verification key endpoint.
	#[serde(default)]
	pub key: Option<KeyConfig>,
}

/// The `oauth.token.cache` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CacheConfig {
	/// Maximum number of cached credentials.
	#[serde(default)]
	pub capacity: Option<usize>,
}

/// A grant section such as `oauth.token.client_credentials`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GrantConfig {
	/// Token endpoint path relative to `server_url`.
	#[serde(default)]
	pub uri: Option<String>,
	/// OAuth client id.
	#[serde(default)]
	pub client_id: Option<String>,
	/// OAuth client secret.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Scopes requested when the cache key carries none.
	#[serde(default)]
	pub scope: Option<ScopeSet>,
}

/// The `oauth.sign` section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OAuthSignConfig {
	/// Signing key endpoint.
	#[serde(default)]
	pub key: Option<KeyConfig>,
}

/// A key endpoint section (`oauth.token.key`, `oauth.sign.key`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct KeyConfig {
	/// Base URL of the key server.
	#[serde(default)]
	pub server_url: Option<Url>,
	/// Key endpoint path relative to `server_url`; the key id is appended.
	#[serde(default)]
	pub uri: Option<String>,
	/// Optional client id for key endpoints that require authentication.
	#[serde(default)]
	pub client_id: Option<String>,
	/// Optional client secret for key endpoints that require authentication.
	#[serde(default)]
	pub client_secret: Option<String>,
}

/// Which key a caller wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPurpose {
	/// Key used to verify tokens issued by the authorization server.
	TokenVerification,
	/// Key used to verify signed payloads.
	Signing,
}

/// Resolved client credentials grant settings.
#[derive(Clone)]
pub struct ClientCredentials {
	/// Absolute token endpoint.
	pub token_url: Url,
	/// OAuth client id.
	pub client_id: String,
	/// OAuth client secret, if configured.
	pub client_secret: Option<String>,
	/// Scopes requested when the cache key carries none.
	pub default_scopes: ScopeSet,
	/// Service id of the authorization server.
	pub service_id: Option<ServiceId>,
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("token_url", &self.token_url.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("default_scopes", &self.default_scopes)
			.field("service_id", &self.service_id)
			.finish()
	}
}

/// Resolved key endpoint.
#[derive(Clone)]
pub struct KeyEndpoint {
	/// Absolute key endpoint; the key id is appended as a path segment.
	pub url: Url,
	/// Optional client id.
	pub client_id: Option<String>,
	/// Optional client secret.
	pub client_secret: Option<String>,
}
impl Debug for KeyEndpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyEndpoint")
			.field("url", &self.url.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

fn millis(value: u64) -> Duration {
	Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

fn clamp(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}

/// Appends `uri` to `base`, keeping any path prefix already on `base`.
fn join_url(base: &Url, uri: &str, section: &str) -> Result<Url> {
	let joined =
		format!("{}/{}", base.as_str().trim_end_matches('/'), uri.trim_start_matches('/'));

	Url::parse(&joined).map_err(|e| {
		ConfigError::Parse { path: section.to_owned(), message: e.to_string() }.into()
	})
}

fn parse_error(path: &serde_path_to_error::Path, inner: &impl Display) -> Error {
	ConfigError::Parse { path: path.to_string(), message: inner.to_string() }.into()
}
