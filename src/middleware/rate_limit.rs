use crate::error::{AirdropError, Result};
use crate::services::KeyValueStore;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-window request counter kept in the shared store, so every instance
/// behind a load balancer sees the same counts.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u64,
    window: Duration,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    /// A `limit` of zero disables limiting.
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
            trust_forwarded_for: false,
        }
    }

    /// Keys clients by the first `X-Forwarded-For` hop. Only safe behind a
    /// proxy that overwrites the header.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub async fn check(&self, scope: &str, client: &str) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }

        let window_secs = self.window.as_secs().max(1);
        let now = Utc::now().timestamp().max(0) as u64;
        let window_index = now / window_secs;
        let key = format!("ratelimit:{}:{}:{}", scope, client, window_index);

        let count = self.store.increment_window(&key, self.window).await?;
        if count > self.limit {
            tracing::warn!(scope, client, count, limit = self.limit, "Rate limit exceeded");
            return Err(AirdropError::RateLimitExceeded {
                retry_after_secs: window_secs - now % window_secs,
            });
        }

        Ok(())
    }
}

/// Peer IP, or the first `X-Forwarded-For` hop when the proxy is trusted.
fn client_id(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.split(',').next())
            .map(str::trim)
            .filter(|h| !h.is_empty())
        {
            return forwarded.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AirdropError> {
    let client = client_id(&request, limiter.trust_forwarded_for);
    let scope = request.uri().path().trim_start_matches('/').replace('/', ".");

    match limiter.check(&scope, &client).await {
        Err(AirdropError::StoreError(e)) => {
            // Store outages must not take verification down with them.
            tracing::warn!("Rate limit store error: {}, allowing request", e);
        }
        other => other?,
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;

    #[tokio::test]
    async fn blocks_after_limit_within_window() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 2, Duration::from_secs(60));

        assert!(limiter.check("verify-payment", "10.0.0.1").await.is_ok());
        assert!(limiter.check("verify-payment", "10.0.0.1").await.is_ok());

        let err = limiter.check("verify-payment", "10.0.0.1").await.unwrap_err();
        match err {
            AirdropError::RateLimitExceeded { retry_after_secs } => {
                assert!((1..=60).contains(&retry_after_secs))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Other clients keep their own budget.
        assert!(limiter.check("verify-payment", "10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn zero_limit_disables() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.check("verify-payment", "10.0.0.1").await.is_ok());
        }
    }

    fn request_from(peer: &str, forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder();
        if let Some(forwarded) = forwarded {
            builder = builder.header("X-Forwarded-For", forwarded);
        }
        let mut request = builder.body(axum::body::Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    }

    #[test]
    fn forwarded_header_ignored_unless_trusted() {
        let request = request_from("198.51.100.4:52000", Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_id(&request, false), "198.51.100.4");
        assert_eq!(client_id(&request, true), "203.0.113.7");

        let request = request_from("198.51.100.4:52000", None);
        assert_eq!(client_id(&request, true), "198.51.100.4");

        let request = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_id(&request, false), "unknown");
    }

    #[tokio::test]
    async fn rotating_forwarded_header_shares_the_peer_budget() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 2, Duration::from_secs(60));

        let mut outcomes = Vec::new();
        for i in 0..4 {
            let request = request_from("198.51.100.4:52000", Some(&format!("10.9.9.{}", i)));
            let client = client_id(&request, limiter.trust_forwarded_for);
            outcomes.push(limiter.check("verify-payment", &client).await.is_ok());
        }

        assert_eq!(outcomes, vec![true, true, false, false]);
    }
}
