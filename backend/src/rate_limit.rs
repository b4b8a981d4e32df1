use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{error::ApiError, routes::AppState};

type HitMap = HashMap<String, Vec<DateTime<Utc>>>;

const MAX_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Sliding-window limiter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: chrono::Duration,
    hits: Mutex<HitMap>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window: chrono::Duration::from_std(window.min(MAX_WINDOW))
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `ip`. Returns the seconds until a slot frees up when
    /// the limit is already reached.
    pub async fn check(&self, ip: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let window_start = now - self.window;
        let mut hits = self.hits.lock().await;
        let entries = hits.entry(ip.to_string()).or_default();
        entries.retain(|timestamp| *timestamp > window_start);

        if entries.len() >= self.max_requests {
            let reset_at = entries
                .first()
                .map(|oldest| *oldest + self.window)
                .unwrap_or(now + self.window);
            return Err((reset_at - now).num_seconds().max(1) as u64);
        }

        entries.push(now);
        Ok(())
    }

    /// Drops clients whose hits all fell out of the window.
    pub async fn prune(&self, now: DateTime<Utc>) {
        let window_start = now - self.window;
        let mut hits = self.hits.lock().await;
        hits.retain(|_, timestamps| {
            timestamps.retain(|timestamp| *timestamp > window_start);
            !timestamps.is_empty()
        });
    }

    pub async fn tracked_clients(&self) -> usize {
        self.hits.lock().await.len()
    }
}

pub fn spawn_pruner(limiter: Arc<RateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            limiter.prune(Utc::now()).await;
            debug!(
                "Rate limiter tracking {} client(s)",
                limiter.tracked_clients().await
            );
        }
    });
}

/// Client address, honouring `X-Forwarded-For` for `trusted_hops` proxies.
pub fn client_ip(headers: &HeaderMap, addr: SocketAddr, trusted_hops: usize) -> String {
    if trusted_hops == 0 {
        return addr.ip().to_string();
    }

    let forwarded: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();

    forwarded
        .iter()
        .rev()
        .nth(trusted_hops - 1)
        .or_else(|| forwarded.first())
        .map(ToString::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

pub async fn enforce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(request).await;
    };

    let ip = client_ip(request.headers(), addr, state.trust_proxy_hops);
    match limiter.check(&ip, Utc::now()).await {
        Ok(()) => next.run(request).await,
        Err(retry_after_seconds) => {
            warn!("Download limit reached for {ip}");
            ApiError::too_many_requests(retry_after_seconds).into_response()
        }
    }
}
