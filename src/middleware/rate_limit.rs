use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::AuthError;

// Past this many tracked clients, buckets that have fully refilled are dropped.
const PRUNE_THRESHOLD: usize = 10_000;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refilled(&self, now: Instant, per_sec: f64) -> f64 {
        self.tokens + now.saturating_duration_since(self.last_refill).as_secs_f64() * per_sec
    }
}

/// Token bucket per client for one group of routes.
///
/// Each client may burst `per_minute` requests; the bucket refills continuously
/// over a minute. A budget of zero turns the limiter off.
pub struct RateLimiter {
    name: &'static str,
    capacity: f64,
    per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn per_minute(name: &'static str, per_minute: u32) -> Self {
        let capacity = f64::from(per_minute);
        Self {
            name,
            capacity,
            per_sec: capacity / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, client: &str) -> Result<(), Duration> {
        self.check_at(client, Instant::now()).await
    }

    /// Takes one token for `client`, or returns how long until one is available.
    pub async fn check_at(&self, client: &str, now: Instant) -> Result<(), Duration> {
        if self.capacity == 0.0 {
            return Ok(());
        }

        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= PRUNE_THRESHOLD {
            let (capacity, per_sec) = (self.capacity, self.per_sec);
            buckets.retain(|_, b| b.refilled(now, per_sec) < capacity);
        }

        let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });
        bucket.tokens = bucket.refilled(now, self.per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.per_sec))
        }
    }
}

/// Client address as seen by the edge: `cf-connecting-ip`, then the first
/// `x-forwarded-for` hop, then the socket peer.
pub fn client_key(req: &Request) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(first) = header("x-forwarded-for").and_then(|v| v.split(',').next()) {
        return first.trim().to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let client = client_key(&req);
    if let Err(retry_after) = limiter.check(&client).await {
        warn!(
            limiter = limiter.name,
            %client,
            retry_after_ms = retry_after.as_millis() as u64,
            "rate limit exceeded"
        );
        return Err(AuthError::too_many_requests());
    }
    Ok(next.run(req).await)
}
