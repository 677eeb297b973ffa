//! Cached token model: the cache key, the token snapshot, and the redacted secret wrapper.

pub mod jwt;
pub mod key;
pub mod secret;
