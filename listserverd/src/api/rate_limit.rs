use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::api::error::ApiError;

/// Fixed-window request limiter keyed by client address.
///
/// Each address may make `max_requests` requests per window; the window
/// starts at the address's first request and resets once it has elapsed.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<HashMap<IpAddr, ClientWindow>>,
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started: Instant,
    hits: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `addr`. On refusal, returns the time left until
    /// the address's window resets.
    pub fn check(&self, addr: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        let client = clients.entry(addr).or_insert(ClientWindow { started: now, hits: 0 });
        if now.duration_since(client.started) >= self.window {
            *client = ClientWindow { started: now, hits: 0 };
        }

        if client.hits >= self.max_requests {
            return Err(self.window - now.duration_since(client.started));
        }
        client.hits += 1;
        Ok(())
    }

    /// Forget addresses whose window has run out; returns how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, client| now.duration_since(client.started) < self.window);
        before - clients.len()
    }

    pub fn tracked(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Middleware applied to every route when rate limiting is enabled
pub async fn limit_by_address(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let origin = peer.ip().to_canonical();
    if let Err(reset_in) = limiter.check(origin) {
        tracing::warn!("Rate limited {} on {}", origin, request.uri().path());
        let secs = reset_in.as_secs() + u64::from(reset_in.subsec_nanos() > 0);
        return Err(ApiError::RateLimited {
            retry_after_secs: secs.max(1),
        });
    }
    Ok(next.run(request).await)
}

/// Periodically drop stale client windows until cancelled
pub async fn run_cleanup(limiter: Arc<RateLimiter>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(limiter.window());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let dropped = limiter.cleanup_expired();
                if dropped > 0 {
                    tracing::debug!("Rate limiter forgot {} idle clients", dropped);
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
