//! Cache strategy contract and the built-in longest-expire strategy.

pub mod longest_expire;

pub use longest_expire::LongestExpireCacheStrategy;

// self
use crate::auth::{CacheKey, Jwt};

/// Bounded mapping from [`CacheKey`] to [`Jwt`] snapshots.
///
/// Implementations must be cheap and non-blocking: the manager calls [`get`](Self::get) and
/// [`put`](Self::put) while holding its resolve-or-create lock.
pub trait CacheStrategy
where
	Self: Send + Sync,
{
	/// Exact-match lookup without side effects.
	fn get(&self, key: &CacheKey) -> Option<Jwt>;

	/// Inserts or replaces the entry for `key`, evicting one entry first if a new key would exceed
	/// the capacity. Returns the evicted snapshot, if any.
	fn put(&self, key: CacheKey, value: Jwt) -> Option<Jwt>;

	/// Removes the entry for `key`.
	fn remove(&self, key: &CacheKey) -> Option<Jwt>;

	/// Number of cached entries.
	fn len(&self) -> usize;

	/// Returns true when nothing is cached.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Maximum number of cached entries.
	fn capacity(&self) -> usize;
}
