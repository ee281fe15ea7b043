use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rate-limit details read from a response's `X-RateLimit-*` headers.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RateLimitHeaders {
    pub(crate) bucket: Option<String>,
    pub(crate) remaining: Option<u32>,
    pub(crate) reset_after: Option<Duration>,
    pub(crate) global: bool,
}

impl RateLimitHeaders {
    pub(crate) fn parse(headers: &HeaderMap) -> Self {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        Self {
            bucket: get("x-ratelimit-bucket").map(str::to_string),
            remaining: get("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
            reset_after: get("x-ratelimit-reset-after")
                .and_then(|v| v.parse::<f64>().ok())
                .and_then(secs_f64),
            global: get("x-ratelimit-global").map_or(false, |v| v == "true"),
        }
    }
}

/// Body of a `429 Too Many Requests` response.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
    #[serde(default)]
    global: bool,
}

/// Reads how long to wait, and whether the limit is global, from a 429.
///
/// The JSON body is preferred; the `Retry-After` header is a fallback.
pub(crate) fn parse_429(headers: &HeaderMap, body: &str) -> (Duration, bool) {
    if let Ok(parsed) = serde_json::from_str::<RateLimitBody>(body) {
        if let Some(wait) = secs_f64(parsed.retry_after) {
            return (wait, parsed.global);
        }
    }

    let wait = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .and_then(secs_f64)
        .unwrap_or(Duration::from_secs(1));

    (wait, RateLimitHeaders::parse(headers).global)
}

fn secs_f64(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

#[derive(Clone, Copy, Debug)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

/// Per-bucket and global rate-limit state, shared by every request.
#[derive(Debug, Default)]
pub(crate) struct RateLimits {
    /// Route bucket key to Discord's bucket hash.
    routes: DashMap<String, String>,
    buckets: DashMap<String, BucketState>,
    global_until: Mutex<Option<Instant>>,
}

impl RateLimits {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns how long to wait before sending on `route_key`.
    pub(crate) fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = *self.global_until.lock() {
            if until > now {
                return Some(until - now);
            }
        }

        let bucket = self.routes.get(route_key)?;
        let state = *self.buckets.get(bucket.value())?;

        (state.remaining == 0 && state.resets_at > now).then(|| state.resets_at - now)
    }

    pub(crate) fn update(&self, route_key: &str, headers: &RateLimitHeaders, now: Instant) {
        let bucket = match &headers.bucket {
            Some(bucket) => bucket,
            None => return,
        };

        let resets_at = now + headers.reset_after.unwrap_or(Duration::from_secs(1));
        self.routes.insert(route_key.to_string(), bucket.clone());
        self.buckets.insert(bucket.clone(), BucketState {
            remaining: headers.remaining.unwrap_or(1),
            resets_at,
        });
    }

    /// Blocks every route for `wait`.
    pub(crate) fn set_global(&self, wait: Duration, now: Instant) {
        debug!("Global rate limit hit, blocking for {:?}.", wait);
        *self.global_until.lock() = Some(now + wait);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn headers_are_parsed() {
        let parsed = RateLimitHeaders::parse(&headers(&[
            ("x-ratelimit-bucket", "abcd"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset-after", "1.5"),
        ]));

        assert_eq!(parsed.bucket.as_deref(), Some("abcd"));
        assert_eq!(parsed.remaining, Some(0));
        assert_eq!(parsed.reset_after, Some(Duration::from_millis(1500)));
        assert!(!parsed.global);
    }

    #[test]
    fn exhausted_bucket_delays_until_reset() {
        let limits = RateLimits::new();
        let now = Instant::now();
        let info = RateLimitHeaders {
            bucket: Some("abcd".into()),
            remaining: Some(0),
            reset_after: Some(Duration::from_secs(2)),
            global: false,
        };

        limits.update("GET /users/@me", &info, now);

        assert_eq!(limits.delay_for("GET /users/@me", now), Some(Duration::from_secs(2)));
        assert_eq!(limits.delay_for("GET /users/@me", now + Duration::from_secs(2)), None);
        assert_eq!(limits.delay_for("GET /gateway/bot", now), None);
    }

    #[test]
    fn global_limit_blocks_every_route() {
        let limits = RateLimits::new();
        let now = Instant::now();

        limits.set_global(Duration::from_secs(3), now);

        assert_eq!(limits.delay_for("anything", now), Some(Duration::from_secs(3)));
    }

    #[test]
    fn body_is_preferred_for_429() {
        let (wait, global) = parse_429(
            &headers(&[("retry-after", "9")]),
            r#"{"message":"You are being rate limited.","retry_after":0.25,"global":true}"#,
        );

        assert_eq!(wait, Duration::from_millis(250));
        assert!(global);

        let (wait, global) = parse_429(&headers(&[("retry-after", "9")]), "");
        assert_eq!(wait, Duration::from_secs(9));
        assert!(!global);
    }
}
