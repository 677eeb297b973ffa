mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use time::Duration;
// self
use common::*;
use oauth2_token_cache::{
	CacheKey, Error, RenewalPolicy, ServiceId,
	error::{DecodeError, FetchError},
};

fn status_of(err: &Error) -> Option<u16> {
	match err {
		Error::Fetch(fetch) => fetch.status(),
		_ => None,
	}
}

#[tokio::test]
async fn fresh_tokens_are_served_without_fetching() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("abc", T0 + Duration::hours(1));

	let first = manager.get_token(&key).await.expect("Initial fetch should succeed.");
	let second = manager.get_token(&key).await.expect("Cached lookup should succeed.");
	let third = manager.get_token(&key).await.expect("Cached lookup should succeed.");

	assert_eq!(token_of(&first), "abc");
	assert_eq!(token_of(&second), "abc");
	assert_eq!(token_of(&third), "abc");
	assert_eq!(fetcher.calls(), 1);
	assert_eq!(manager.metrics().hits(), 2);
	assert_eq!(manager.metrics().successes(), 1);
}

#[tokio::test]
async fn read_scope_token_is_refetched_after_expiry() {
	let fetcher = ScriptedFetcher::default();
	let (manager, clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("abc", T0 + Duration::milliseconds(3_600_000));

	assert_eq!(token_of(&manager.get_token(&key).await.expect("Fetch should succeed.")), "abc");
	assert_eq!(token_of(&manager.get_token(&key).await.expect("Lookup should succeed.")), "abc");
	assert_eq!(fetcher.calls(), 1);

	clock.set(T0 + Duration::milliseconds(3_650_000));
	fetcher.issue("def", T0 + Duration::hours(3));

	let renewed = manager.get_token(&key).await.expect("Expired token should be refetched.");

	assert_eq!(token_of(&renewed), "def");
	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn renewal_window_boundary_decides_fetching() {
	let fetcher = ScriptedFetcher::default();
	let clock = oauth2_token_cache::clock::ManualClock::new(T0);
	let window = Duration::seconds(60);
	let manager = builder(&fetcher, &clock)
		.with_policy(RenewalPolicy::default().with_renew_before_expired(window))
		.build();
	let key = key("read");
	let expires_at = T0 + Duration::hours(1);

	fetcher.issue("abc", expires_at);
	manager.get_token(&key).await.expect("Initial fetch should succeed.");

	clock.set(expires_at - window - Duration::milliseconds(1));

	let before = manager.get_token(&key).await.expect("Fresh lookup should succeed.");

	assert_eq!(token_of(&before), "abc");
	assert_eq!(fetcher.calls(), 1);

	clock.set(expires_at - window + Duration::milliseconds(1));
	fetcher.issue("def", expires_at + Duration::hours(1));

	let inside = manager.get_token(&key).await.expect("Early renewal should succeed.");

	assert_eq!(token_of(&inside), "def");
	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn keys_renew_independently() {
	let fetcher = ScriptedFetcher::default();
	let (manager, clock) = manager(&fetcher);
	let short = key("short");
	let long = key("long");

	fetcher.issue("short-1", T0 + Duration::minutes(10)).issue("long-1", T0 + Duration::hours(2));
	manager.get_token(&short).await.expect("Short-lived fetch should succeed.");
	manager.get_token(&long).await.expect("Long-lived fetch should succeed.");

	clock.advance(Duration::minutes(20));
	fetcher.issue("short-2", T0 + Duration::hours(1));

	let renewed = manager.get_token(&short).await.expect("Expired key should renew.");
	let untouched = manager.cached(&long).expect("Long-lived key should stay cached.");

	assert_eq!(token_of(&renewed), "short-2");
	assert_eq!(token_of(&untouched), "long-1");
	assert_eq!(untouched.expires_at, Some(T0 + Duration::hours(2)));
	assert_eq!(untouched.generation, 1);
	assert_eq!(fetcher.calls(), 3);
}

#[tokio::test]
async fn failed_fetch_backs_off_then_retries_once() {
	let fetcher = ScriptedFetcher::default();
	let (manager, clock) = manager(&fetcher);
	let key = key("read");

	fetcher.reject(503);

	let first = manager.get_token(&key).await.expect_err("Rejected fetch should fail.");

	assert_eq!(status_of(&first), Some(503));
	assert_eq!(first.code(), Error::GET_TOKEN_ERROR);

	clock.advance(Duration::milliseconds(1_999));

	let replayed = manager.get_token(&key).await.expect_err("Backoff should replay the failure.");

	assert_eq!(status_of(&replayed), Some(503));
	assert_eq!(fetcher.calls(), 1);

	clock.advance(Duration::milliseconds(1));
	fetcher.issue("abc", T0 + Duration::hours(1));

	let recovered = manager.get_token(&key).await.expect("Retry after backoff should succeed.");

	assert_eq!(token_of(&recovered), "abc");
	assert_eq!(fetcher.calls(), 2);
	assert_eq!(manager.metrics().failures(), 1);
	assert!(manager.cached(&key).expect("Entry should be cached.").last_failure.is_none());
}

#[tokio::test]
async fn expired_token_failure_backs_off_without_serving_stale_token() {
	let fetcher = ScriptedFetcher::default();
	let (manager, clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("abc", T0 + Duration::minutes(5));
	manager.get_token(&key).await.expect("Initial fetch should succeed.");

	clock.advance(Duration::minutes(6));
	fetcher.reject(500);

	manager.get_token(&key).await.expect_err("Expired token renewal should fail.");
	manager.get_token(&key).await.expect_err("Backoff should not serve the expired token.");

	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn early_renewal_failure_keeps_serving_valid_token() {
	let fetcher = ScriptedFetcher::default();
	let (manager, clock) = manager(&fetcher);
	let key = key("read");
	let expires_at = T0 + Duration::hours(1);

	fetcher.issue("abc", expires_at);
	manager.get_token(&key).await.expect("Initial fetch should succeed.");

	clock.set(expires_at - Duration::seconds(30));
	fetcher.reject(502);

	let served = manager.get_token(&key).await.expect("Early failure should keep the token.");

	assert_eq!(token_of(&served), "abc");
	assert_eq!(fetcher.calls(), 2);

	clock.advance(Duration::seconds(3));

	let still = manager.get_token(&key).await.expect("Early retry delay should serve the cache.");

	assert_eq!(token_of(&still), "abc");
	assert_eq!(fetcher.calls(), 2);

	clock.advance(Duration::seconds(1));
	fetcher.issue("def", expires_at + Duration::hours(1));

	let renewed = manager.get_token(&key).await.expect("Early retry should renew.");

	assert_eq!(token_of(&renewed), "def");
	assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_lookups_fetch_once() {
	let fetcher = ScriptedFetcher::default().with_delay(StdDuration::from_millis(50));
	let (manager, _clock) = manager(&fetcher);
	let manager = Arc::new(manager);

	fetcher.issue("abc", T0 + Duration::hours(1));

	let tasks = (0..16)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.get_token(&key("read")).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let jwt =
			task.await.expect("Lookup task should not panic.").expect("Lookup should succeed.");

		assert_eq!(token_of(&jwt), "abc");
	}

	assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_lookups_share_one_failure() {
	let fetcher = ScriptedFetcher::default().with_delay(StdDuration::from_millis(50));
	let (manager, _clock) = manager(&fetcher);
	let manager = Arc::new(manager);

	fetcher.reject(503);

	let tasks = (0..16)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.get_token(&key("read")).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let err = task
			.await
			.expect("Lookup task should not panic.")
			.expect_err("Every caller should observe the failure.");

		assert_eq!(status_of(&err), Some(503));
	}

	assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_after_expiry_fetch_once() {
	let fetcher = ScriptedFetcher::default().with_delay(StdDuration::from_millis(50));
	let (manager, clock) = manager(&fetcher);
	let manager = Arc::new(manager);
	let expires_at = T0 + Duration::hours(1);

	fetcher.issue("abc", expires_at);
	manager.get_token(&key("read")).await.expect("Initial fetch should succeed.");

	clock.set(expires_at + Duration::seconds(1));
	fetcher.issue("def", T0 + Duration::hours(3));

	let tasks = (0..16)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.get_token(&key("read")).await })
		})
		.collect::<Vec<_>>();

	for task in tasks {
		let jwt =
			task.await.expect("Lookup task should not panic.").expect("Lookup should succeed.");

		assert_eq!(token_of(&jwt), "def");
	}

	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn early_renewal_in_flight_does_not_block_other_callers() {
	let fetcher = ScriptedFetcher::default().with_delay(StdDuration::from_millis(200));
	let (manager, clock) = manager(&fetcher);
	let manager = Arc::new(manager);
	let expires_at = T0 + Duration::hours(1);

	fetcher.issue("abc", expires_at);
	manager.get_token(&key("read")).await.expect("Initial fetch should succeed.");

	clock.set(expires_at - Duration::seconds(10));
	fetcher.issue("def", expires_at + Duration::hours(1));

	let renewing = {
		let manager = manager.clone();

		tokio::spawn(async move { manager.get_token(&key("read")).await })
	};

	tokio::time::sleep(StdDuration::from_millis(50)).await;

	let read_key = key("read");
	let lookup = manager.get_token(&read_key);
	let cached = tokio::time::timeout(StdDuration::from_millis(100), lookup)
		.await
		.expect("Cached lookup should not wait for the renewal.")
		.expect("Cached lookup should succeed.");

	assert_eq!(token_of(&cached), "abc");

	let renewed = renewing
		.await
		.expect("Renewal task should not panic.")
		.expect("Early renewal should succeed.");

	assert_eq!(token_of(&renewed), "def");
	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn cancelled_renewal_clears_renewing_flag() {
	let fetcher = ScriptedFetcher::default().with_delay(StdDuration::from_secs(5));
	let (manager, _clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("abc", T0 + Duration::hours(1));

	let outcome = tokio::time::timeout(StdDuration::from_millis(20), manager.get_token(&key)).await;

	assert!(outcome.is_err());

	let entry = manager.cached(&key).expect("Empty entry should remain cached.");

	assert!(!entry.renewing);
	assert!(entry.token.is_none());
}

#[tokio::test]
async fn undecodable_token_is_a_token_failure() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);

	fetcher.issue_undecodable("opaque");

	let err = manager.get_default_token().await.expect_err("Undecodable token should fail.");

	assert!(matches!(err, Error::Decode(DecodeError::MissingExpiry)));
	assert_eq!(err.code(), Error::GET_TOKEN_ERROR);
}

#[tokio::test]
async fn scope_less_keys_request_default_scopes() {
	let fetcher = ScriptedFetcher::default();
	let clock = oauth2_token_cache::clock::ManualClock::new(T0);
	let manager = builder(&fetcher, &clock).with_default_scopes(scopes("petstore.r")).build();

	fetcher.issue("default", T0 + Duration::hours(1)).issue("scoped", T0 + Duration::hours(1));
	manager.get_default_token().await.expect("Default token should be fetched.");
	manager.get_token(&key("petstore.w")).await.expect("Scoped token should be fetched.");

	let requests = fetcher.requests();

	assert_eq!(requests[0].key, CacheKey::default());
	assert_eq!(requests[0].scope, scopes("petstore.r"));
	assert_eq!(requests[1].scope, scopes("petstore.w"));
}

#[tokio::test]
async fn lookups_by_parts_prefer_scopes() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);
	let service = ServiceId::new("petstore").expect("Service fixture should be valid.");

	fetcher.issue("scoped", T0 + Duration::hours(1)).issue("service", T0 + Duration::hours(1));

	let scoped = manager
		.get_token_for(Some(scopes("read")), Some(service.clone()))
		.await
		.expect("Scoped lookup should succeed.");
	let by_service = manager
		.get_token_for(None, Some(service.clone()))
		.await
		.expect("Service lookup should succeed.");

	assert_eq!(scoped.key, key("read"));
	assert_eq!(token_of(&scoped), "scoped");
	assert_eq!(by_service.key, CacheKey::for_service(service));
	assert_eq!(token_of(&by_service), "service");
}

#[tokio::test]
async fn invalidate_forces_a_new_fetch() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("abc", T0 + Duration::hours(1)).issue("def", T0 + Duration::hours(1));
	manager.get_token(&key).await.expect("Initial fetch should succeed.");

	assert!(manager.invalidate(&key).is_some());
	assert!(manager.cached(&key).is_none());

	let refetched = manager.get_token(&key).await.expect("Refetch should succeed.");

	assert_eq!(token_of(&refetched), "def");
	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn transport_failures_surface_as_fetch_errors() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);

	let err = manager.get_default_token().await.expect_err("Exhausted script should fail.");

	assert!(matches!(err, Error::Fetch(FetchError::TokenEndpoint { status: None, .. })));
}

#[tokio::test]
async fn already_expired_token_is_rejected_and_backs_off() {
	let fetcher = ScriptedFetcher::default();
	let (manager, _clock) = manager(&fetcher);
	let key = key("read");

	fetcher.issue("stale", T0 - Duration::seconds(1));

	let first = manager.get_token(&key).await.expect_err("An expired token should be rejected.");

	assert!(matches!(
		first,
		Error::Decode(DecodeError::AlreadyExpired { expires_at })
			if expires_at == T0 - Duration::seconds(1)
	));

	for _ in 0..2 {
		let replayed = manager.get_token(&key).await.expect_err("Backoff should replay the failure.");

		assert!(matches!(replayed, Error::Decode(DecodeError::AlreadyExpired { .. })));
	}

	assert_eq!(fetcher.calls(), 1);
	assert!(manager.cached(&key).is_some_and(|jwt| jwt.access_token().is_none()));
}

#[tokio::test]
async fn new_keys_evict_through_the_manager() {
	let fetcher = ScriptedFetcher::default();
	let clock = oauth2_token_cache::clock::ManualClock::new(T0);
	let manager = builder(&fetcher, &clock).with_capacity(2).build();

	fetcher
		.issue("a", T0 + Duration::hours(1))
		.issue("b", T0 + Duration::hours(2))
		.issue("c", T0 + Duration::minutes(30))
		.issue("b2", T0 + Duration::hours(2));

	manager.get_token(&key("a")).await.expect("Fetch for a should succeed.");
	manager.get_token(&key("b")).await.expect("Fetch for b should succeed.");

	let c = manager.get_token(&key("c")).await.expect("Fetch for c should succeed.");

	assert_eq!(token_of(&c), "c");
	assert!(manager.cached(&key("b")).is_none());
	assert!(manager.cached(&key("a")).is_some());

	let b = manager.get_token(&key("b")).await.expect("Evicted key should be fetched again.");

	assert_eq!(token_of(&b), "b2");
	assert_eq!(fetcher.calls(), 4);
	assert!(manager.cached(&key("a")).is_none());
	assert!(manager.cached(&key("c")).is_some());
}
