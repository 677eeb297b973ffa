//! Expiry extraction for JWT access tokens.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::DecodeError, fetch::ExpiryExtractor};

#[derive(Deserialize)]
struct Claims {
	#[serde(default)]
	exp: Option<i64>,
}

/// Reads the `exp` claim (seconds since the epoch) from a compact-serialized JWT.
///
/// The signature is not verified; the token came straight from the issuer over the fetcher's
/// transport and only its lifetime is needed here.
#[derive(Clone, Copy, Debug, Default)]
pub struct JwtExpiryExtractor;
impl JwtExpiryExtractor {
	fn claims(token: &str) -> Result<Claims, DecodeError> {
		let mut segments = token.split('.');
		let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(header), Some(payload), Some(_), None)
				if !header.is_empty() && !payload.is_empty() =>
				payload,
			_ => return Err(DecodeError::Malformed),
		};
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| DecodeError::Base64 { message: e.to_string() })?;

		serde_json::from_slice(&bytes).map_err(|e| DecodeError::Claims { message: e.to_string() })
	}
}
impl ExpiryExtractor for JwtExpiryExtractor {
	fn expires_at(&self, token: &str) -> Result<OffsetDateTime, DecodeError> {
		let exp = Self::claims(token)?.exp.ok_or(DecodeError::MissingExpiry)?;

		OffsetDateTime::from_unix_timestamp(exp).map_err(|_| DecodeError::ExpiryOutOfRange { exp })
	}
}
