use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    refreshed: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            refreshed: now,
        }
    }

    /// Take one token, or report how long until one is available.
    fn take(&mut self, capacity: f64, per_sec: f64, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.refreshed).as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_sec).min(capacity);
        self.refreshed = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - self.tokens;
        let wait = if per_sec > 0.0 { missing / per_sec } else { f64::MAX };
        Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
    }
}

/// Per-client token buckets. A client is whatever key the caller presents
/// (API key or `anonymous`).
pub struct RateLimiter {
    burst: f64,
    per_sec: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(burst: f64, per_sec: f64) -> Self {
        Self {
            burst,
            per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request from `client`. `Err` carries the suggested wait.
    pub fn admit(&self, client: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::full(self.burst, now))
            .take(self.burst, self.per_sec, now)
    }

    /// Forget clients not seen for `max_idle`.
    pub fn forget_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .retain(|_, bucket| now.saturating_duration_since(bucket.refreshed) < max_idle);
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }
}
