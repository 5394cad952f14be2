use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{RateLimitStore, StoreResult};

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// End of the current window
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(HEADER_RESET, HeaderValue::from(self.reset_at.timestamp()));
    }
}

/// Fixed-window counter per API key
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window_secs: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window_secs: i64) -> Self {
        Self {
            store,
            window_secs: window_secs.max(1),
        }
    }

    /// Counts this request against the key's window. Every call increments,
    /// including rejected ones.
    pub async fn check(
        &self,
        api_key_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitDecision> {
        let window_start = self.window_start(now);
        let count = self.store.increment(api_key_id, window_start).await?;

        Ok(RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: window_start + Duration::seconds(self.window_secs),
        })
    }

    /// Removes counters for windows that have already closed
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.store.purge_before(self.window_start(now)).await
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = now.timestamp();
        let start = ts - ts.rem_euclid(self.window_secs);
        Utc.timestamp_opt(start, 0).single().unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), 60)
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    #[tokio::test]
    async fn remaining_decreases_then_rejects() {
        let limiter = limiter();
        let key = Uuid::new_v4();
        let now = at(1_700_000_010);

        let first = limiter.check(key, 2, now).await.unwrap();
        let second = limiter.check(key, 2, now).await.unwrap();
        let third = limiter.check(key, 2, now).await.unwrap();

        assert!(first.allowed && second.allowed);
        assert_eq!((first.remaining, second.remaining), (1, 0));
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_at, at(1_700_000_040));
    }

    #[tokio::test]
    async fn counter_resets_at_window_boundary() {
        let limiter = limiter();
        let key = Uuid::new_v4();

        assert!(limiter.check(key, 1, at(1_700_000_039)).await.unwrap().allowed);
        assert!(!limiter.check(key, 1, at(1_700_000_039)).await.unwrap().allowed);

        let next = limiter.check(key, 1, at(1_700_000_040)).await.unwrap();
        assert!(next.allowed);
        assert_eq!(next.reset_at, at(1_700_000_100));
    }

    #[tokio::test]
    async fn keys_are_counted_independently() {
        let limiter = limiter();
        let now = at(1_700_000_000);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        limiter.check(a, 5, now).await.unwrap();
        limiter.check(a, 5, now).await.unwrap();
        let other = limiter.check(b, 5, now).await.unwrap();

        assert_eq!(other.remaining, 4);
    }

    #[test]
    fn headers_are_written() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 60,
            remaining: 59,
            reset_at: at(1_700_000_040),
        };
        let mut headers = HeaderMap::new();
        decision.apply_headers(&mut headers);

        assert_eq!(headers["x-ratelimit-remaining"], "59");
        assert_eq!(headers["x-ratelimit-reset"], "1700000040");
        assert_eq!(headers["x-ratelimit-limit"], "60");
    }
}
