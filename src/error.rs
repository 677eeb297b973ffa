//! Crate-level error types shared across the cache, manager, and fetchers.
//!
//! Every error is [`Clone`] so a renewal failure can be recorded on the cached entry and replayed
//! to callers that arrive during the retry backoff window.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The token fetcher could not obtain or parse a token.
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// The expiry extractor could not decode the token claims.
	#[error(transparent)]
	Decode(#[from] DecodeError),
}
impl Error {
	/// Status code used when a token cannot be obtained from the authorization server.
	pub const GET_TOKEN_ERROR: &'static str = "GET_TOKEN_ERROR";
	/// Status code used when a required configuration section is absent.
	pub const CONFIG_PROPERTY_MISSING: &'static str = "CONFIG_PROPERTY_MISSING";
	/// Status code used when configuration is present but unusable.
	pub const CONFIG_INVALID: &'static str = "CONFIG_INVALID";

	/// Returns the stable status code for this error.
	///
	/// Fetch and decode failures share [`Error::GET_TOKEN_ERROR`] because callers handle both the
	/// same way: no usable token is available.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Config(ConfigError::Missing { .. }) => Self::CONFIG_PROPERTY_MISSING,
			Self::Config(_) => Self::CONFIG_INVALID,
			Self::Fetch(_) | Self::Decode(_) => Self::GET_TOKEN_ERROR,
		}
	}

	/// Returns `true` when the failure came from the fetch or decode step.
	pub fn is_token_failure(&self) -> bool {
		matches!(self, Self::Fetch(_) | Self::Decode(_))
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// A required configuration section or value is absent.
	#[error("Configuration is missing `{section}`.")]
	Missing {
		/// Dotted path of the missing section or value.
		section: String,
	},
	/// The configuration file could not be read.
	#[error("Configuration file `{file}` could not be read.")]
	Read {
		/// Path of the file.
		file: String,
		/// Underlying I/O failure.
		#[source]
		source: SharedError,
	},
	/// The configuration document could not be deserialized.
	#[error("Configuration could not be parsed at `{path}`: {message}.")]
	Parse {
		/// Path inside the document where parsing failed (`.` for the root).
		path: String,
		/// Deserializer message.
		message: String,
	},
	/// Configured or requested scopes are invalid.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// A service identifier is invalid.
	#[error("Service identifier is invalid.")]
	InvalidServiceId(#[from] crate::auth::IdentifierError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
}
impl ConfigError {
	/// Builds a [`ConfigError::Missing`] for the provided section path.
	pub fn missing(section: impl Into<String>) -> Self {
		Self::Missing { section: section.into() }
	}

	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}

/// Failures raised while obtaining a token from the authorization server.
#[derive(Clone, Debug, ThisError)]
pub enum FetchError {
	/// The token endpoint answered with a non-success status.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or fetcher-supplied message summarizing the failure.
		message: String,
	},
	/// Network, TLS, or timeout failure while calling the endpoint.
	#[error("Network error occurred while calling the token endpoint.")]
	Transport {
		/// Transport-specific error.
		#[source]
		source: SharedError,
	},
	/// The endpoint responded with a body that could not be parsed.
	#[error("Token endpoint returned a malformed body at `{path}`: {message}.")]
	ResponseParse {
		/// Path inside the JSON body where parsing failed.
		path: String,
		/// Parser message.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl FetchError {
	/// Wraps a transport-specific failure.
	pub fn transport(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Transport { source: Arc::new(src) }
	}

	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::ResponseParse { status, .. } => *status,
			Self::Transport { .. } => None,
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for FetchError {
	fn from(e: ReqwestError) -> Self {
		Self::transport(e)
	}
}

/// Failures raised while decoding the expiry embedded in a token.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// The token does not have the `header.payload.signature` shape.
	#[error("Token is not a well-formed JWT.")]
	Malformed,
	/// The payload segment is not valid base64url.
	#[error("Token payload is not valid base64url: {message}.")]
	Base64 {
		/// Decoder message.
		message: String,
	},
	/// The payload segment is not a JSON object.
	#[error("Token claims are not valid JSON: {message}.")]
	Claims {
		/// Parser message.
		message: String,
	},
	/// The claims do not carry an `exp` value.
	#[error("Token claims are missing `exp`.")]
	MissingExpiry,
	/// The `exp` value cannot be represented as an instant.
	#[error("Token `exp` value {exp} is out of range.")]
	ExpiryOutOfRange {
		/// Raw `exp` value in seconds since the epoch.
		exp: i64,
	},
	/// The issuer handed out a token whose expiry is not in the future.
	#[error("Token expired at {expires_at} before it could be cached.")]
	AlreadyExpired {
		/// Decoded expiry instant.
		expires_at: OffsetDateTime,
	},
}
