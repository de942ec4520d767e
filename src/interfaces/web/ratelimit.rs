use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use super::AppState;
use crate::config::RateLimitConfig;

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    enabled: bool,
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_millis(config.window_ms.max(1)),
            max_requests: config.max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request for `ip`; `false` means the window is exhausted.
    pub async fn check(&self, ip: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(ip).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_requests
    }
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if !state.rate_limiter.check(ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({
                "success": false,
                "error": "Rate limit exceeded, retry later",
            })),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_limiter_always_passes() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            window_ms: 1000,
            max_requests: 1,
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..10 {
            assert!(limiter.check(ip).await);
        }
    }

    #[tokio::test]
    async fn window_exhausts_then_resets() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            window_ms: 50,
            max_requests: 2,
        });
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(limiter.check(ip).await);
        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check(ip).await);
    }

    #[tokio::test]
    async fn windows_are_per_client() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            window_ms: 10_000,
            max_requests: 1,
        });
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(limiter.check(a).await);
        assert!(!limiter.check(a).await);
        assert!(limiter.check(b).await);
    }
}
