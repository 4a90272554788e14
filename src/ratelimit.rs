use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{error::ApiError, state::AppState};

/// Fixed-window request counter keyed by client address. Counters live in
/// process memory; restarting the server resets all windows.
pub struct FixedWindow {
    max_requests: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, (Instant, u32)>>,
}

impl FixedWindow {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` at `now` and reports whether it is within the
    /// cap. Taking `now` as a parameter keeps the window math testable.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limit lock poisoned");
        let entry = buckets.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_requests
    }
}

/// Middleware for the auth route prefix: credential endpoints are the ones
/// worth brute-forcing.
pub async fn limit_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    if state.limiter.check(&key, Instant::now()) {
        next.run(req).await
    } else {
        warn!(client = %key, "rate limit exceeded on auth routes");
        ApiError::TooManyRequests.into_response()
    }
}

fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_is_enforced_within_one_window() {
        let limiter = FixedWindow::new(3, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check("1.2.3.4", now));
        assert!(limiter.check("1.2.3.4", now));
        assert!(limiter.check("1.2.3.4", now));
        assert!(!limiter.check("1.2.3.4", now));
    }

    #[test]
    fn a_fresh_window_admits_again() {
        let limiter = FixedWindow::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check("k", start));
        assert!(!limiter.check("k", start + Duration::from_secs(59)));
        assert!(limiter.check("k", start + Duration::from_secs(60)));
    }

    #[test]
    fn clients_do_not_share_buckets() {
        let limiter = FixedWindow::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check("a", now));
        assert!(limiter.check("b", now));
        assert!(!limiter.check("a", now));
    }

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(client_key(&req), "203.0.113.9");

        let req = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&req), "local");
    }
}
