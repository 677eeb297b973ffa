//! Bounded [`CacheStrategy`] that evicts the entry expiring furthest in the future.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, Jwt},
	cache::CacheStrategy,
	obs,
};

/// Default number of cached credentials.
pub const DEFAULT_CAPACITY: usize = 200;

type CacheMap = RwLock<HashMap<CacheKey, Jwt>>;

/// Thread-safe cache that, when full, sacrifices the token with the longest remaining lifetime.
///
/// Entries that were never fetched (no `expires_at`) rank lowest and are evicted last. Reads take a
/// shared lock; inserts and evictions happen under one exclusive lock so the size never exceeds
/// [`capacity`](CacheStrategy::capacity).
#[derive(Debug)]
pub struct LongestExpireCacheStrategy {
	map: CacheMap,
	capacity: usize,
}
impl LongestExpireCacheStrategy {
	/// Creates a cache bounded to `capacity` entries; zero is treated as one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self { map: RwLock::new(HashMap::with_capacity(capacity.min(DEFAULT_CAPACITY))), capacity }
	}

	/// Copies every cached snapshot, in no particular order.
	pub fn snapshot(&self) -> Vec<Jwt> {
		self.map.read().values().cloned().collect()
	}

	fn eviction_candidate(map: &HashMap<CacheKey, Jwt>) -> Option<CacheKey> {
		map.iter().max_by_key(|(_, jwt)| jwt.expires_at).map(|(key, _)| key.clone())
	}
}
impl Default for LongestExpireCacheStrategy {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
impl CacheStrategy for LongestExpireCacheStrategy {
	fn get(&self, key: &CacheKey) -> Option<Jwt> {
		self.map.read().get(key).cloned()
	}

	fn put(&self, key: CacheKey, value: Jwt) -> Option<Jwt> {
		let mut map = self.map.write();
		let evicted = if !map.contains_key(&key) && map.len() >= self.capacity {
			Self::eviction_candidate(&map).and_then(|victim| map.remove(&victim))
		} else {
			None
		};

		if let Some(evicted) = &evicted {
			tracing::debug!(
				key = %evicted.key,
				expires_at = ?evicted.expires_at,
				capacity = self.capacity,
				"evicted longest-lived token"
			);
			obs::record_eviction();
		}

		map.insert(key, value);

		evicted
	}

	fn remove(&self, key: &CacheKey) -> Option<Jwt> {
		self.map.write().remove(key)
	}

	fn len(&self) -> usize {
		self.map.read().len()
	}

	fn capacity(&self) -> usize {
		self.capacity
	}
}
