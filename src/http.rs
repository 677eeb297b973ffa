//! Reqwest-backed [`TokenFetcher`] for the client credentials grant and key endpoints.
//!
//! Token requests post `grant_type=client_credentials` (plus `scope` when non-empty) with
//! `client_secret_basic` authentication. Redirects are never followed: token and key endpoints
//! must answer directly.

// crates.io
use reqwest::{StatusCode, redirect::Policy};
// self
use crate::{
	_prelude::*,
	auth::KeyId,
	config::{ClientConfig, ClientCredentials, KeyEndpoint, KeyPurpose},
	error::{ConfigError, FetchError},
	fetch::{FetchFuture, TokenFetcher, TokenRequest, TokenResponse},
};

#[derive(Deserialize)]
struct OAuthErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// [`TokenFetcher`] that talks to the configured authorization server over reqwest.
#[derive(Clone)]
pub struct ReqwestTokenFetcher {
	client: ReqwestClient,
	credentials: ClientCredentials,
	config: Arc<ClientConfig>,
}
impl ReqwestTokenFetcher {
	/// Builds a fetcher from the client configuration, applying `request.timeout`.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let client = ReqwestClient::builder()
			.timeout(config.request_timeout())
			.redirect(Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Self::with_client(client, config)
	}

	/// Reuses an existing reqwest [`ReqwestClient`].
	///
	/// The client should not follow redirects.
	pub fn with_client(client: ReqwestClient, config: &ClientConfig) -> Result<Self> {
		let credentials = config.client_credentials()?;

		Ok(Self { client, credentials, config: Arc::new(config.clone()) })
	}

	/// Resolved client credentials settings.
	pub fn credentials(&self) -> &ClientCredentials {
		&self.credentials
	}

	/// Downloads the key used to verify tokens issued by the authorization server.
	pub async fn fetch_token_key(&self, kid: &KeyId) -> Result<String> {
		self.fetch_key(KeyPurpose::TokenVerification, kid).await
	}

	/// Downloads the key used to verify signed payloads.
	pub async fn fetch_sign_key(&self, kid: &KeyId) -> Result<String> {
		self.fetch_key(KeyPurpose::Signing, kid).await
	}

	async fn fetch_key(&self, purpose: KeyPurpose, kid: &KeyId) -> Result<String> {
		let endpoint = self.config.key_endpoint(purpose)?;
		let url = key_url(&endpoint, kid)?;
		let mut request = self.client.get(url);

		if let Some(client_id) = &endpoint.client_id {
			request = request.basic_auth(client_id, endpoint.client_secret.as_deref());
		}

		let response = request.send().await.map_err(FetchError::from)?;
		let status = response.status();
		let body = response.text().await.map_err(FetchError::from)?;

		if !status.is_success() {
			tracing::warn!(%kid, status = status.as_u16(), "key endpoint rejected the request");

			return Err(endpoint_error(status, &body).into());
		}

		Ok(body)
	}

	async fn post_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
		let credentials = &self.credentials;
		let scope = request.scope.normalized();
		let mut form = vec![("grant_type", "client_credentials")];

		if !scope.is_empty() {
			form.push(("scope", scope.as_str()));
		}

		let response = self
			.client
			.post(credentials.token_url.clone())
			.basic_auth(&credentials.client_id, credentials.client_secret.as_deref())
			.form(&form)
			.send()
			.await
			.map_err(FetchError::from)?;
		let status = response.status();
		let body = response.bytes().await.map_err(FetchError::from)?;

		if !status.is_success() {
			return Err(endpoint_error(status, &String::from_utf8_lossy(&body)).into());
		}

		parse_token_response(&body, status)
	}
}
impl TokenFetcher for ReqwestTokenFetcher {
	fn fetch<'a>(&'a self, request: &'a TokenRequest) -> FetchFuture<'a, TokenResponse> {
		Box::pin(self.post_token(request))
	}
}
impl Debug for ReqwestTokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReqwestTokenFetcher").field("credentials", &self.credentials).finish()
	}
}

fn key_url(endpoint: &KeyEndpoint, kid: &KeyId) -> Result<Url> {
	let mut url = endpoint.url.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::Parse {
			path: endpoint.url.to_string(),
			message: "key endpoint cannot carry path segments".into(),
		})?
		.pop_if_empty()
		.push(kid);

	Ok(url)
}

fn parse_token_response(body: &[u8], status: StatusCode) -> Result<TokenResponse> {
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de).map_err(|e| {
		FetchError::ResponseParse {
			path: e.path().to_string(),
			message: e.inner().to_string(),
			status: Some(status.as_u16()),
		}
		.into()
	})
}

fn endpoint_error(status: StatusCode, body: &str) -> FetchError {
	let message = match serde_json::from_str::<OAuthErrorBody>(body) {
		Ok(OAuthErrorBody { error, error_description: Some(description) }) =>
			format!("{error}: {description}"),
		Ok(OAuthErrorBody { error, error_description: None }) => error,
		Err(_) => format!("HTTP {status}"),
	};

	FetchError::TokenEndpoint { status: Some(status.as_u16()), message }
}
