//! Builds a token manager from a `client.yml` document and reuses the cached default token.
//!
//! A local mock authorization server answers the client credentials grant, so the demo runs
//! without network access.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use oauth2_token_cache::{ClientConfig, TokenManager};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let exp = (OffsetDateTime::now_utc() + Duration::minutes(15)).unix_timestamp();
	let token = format!(
		"{}.{}.demo-signature",
		URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
		URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"demo-client","exp":{exp}}}"#)),
	);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/oauth2/token");
			then.status(200).header("content-type", "application/json").body(format!(
				r#"{{"access_token":"{token}","token_type":"bearer","expires_in":900}}"#
			));
		})
		.await;
	let config = ClientConfig::from_yaml_str(&format!(
		r#"
oauth:
  token:
    server_url: {base}/auth
    client_credentials:
      uri: /oauth2/token
      client_id: demo-client
      client_secret: super-secret
      scope: [email.read, profile.read]
"#,
		base = server.base_url(),
	))?;
	let manager = TokenManager::from_config(&config)?;
	let first = manager.get_default_token().await?;
	let second = manager.get_default_token().await?;

	println!("Cached token expires at {:?}.", first.expires_at);
	println!("Second lookup reused it: {}.", first.access_token() == second.access_token());

	token_mock.assert_async().await;

	Ok(())
}
