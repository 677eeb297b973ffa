//! Client-side OAuth 2.0 token cache: longest-expire eviction, early renewal, retry backoff, and
//! singleflight fetches so service-to-service calls always carry a usable bearer token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
#[cfg(feature = "reqwest")] pub mod http;
pub mod manager;
pub mod obs;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use crate::http::ReqwestTokenFetcher;
pub use crate::{
	auth::{CacheKey, Jwt, RenewalState, ScopeSet, ServiceId},
	cache::{CacheStrategy, LongestExpireCacheStrategy},
	clock::{Clock, SystemClock},
	config::{ClientConfig, RenewalPolicy},
	error::{Error, Result},
	fetch::{ExpiryExtractor, JwtExpiryExtractor, TokenFetcher, TokenRequest, TokenResponse},
	manager::{RenewalMetrics, TokenManager, TokenManagerBuilder},
};
#[cfg(feature = "reqwest")] pub use reqwest;
pub use time;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
