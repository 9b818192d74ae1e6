// crates/server/src/middleware/rate_limit.rs
//! In-memory sliding-window rate limiting.
//!
//! Per-client request timestamps over a 60-second window; suitable for a
//! single-instance deployment. Every limited response advertises
//! `X-RateLimit-Limit/Remaining/Reset`; a breach returns 429 with
//! `Retry-After`. The health endpoint is exempt. Disabled entirely when
//! the configured limit is 0 (no headers are emitted then).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

const WINDOW_SECS: f64 = 60.0;

#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    requests: Mutex<HashMap<String, Vec<f64>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_at: f64,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.requests_per_minute
    }

    /// Check and (when allowed) record one request at time `now`.
    pub fn check(&self, client_id: &str, now: f64) -> RateDecision {
        let mut requests = self.requests.lock().expect("rate limiter lock");

        // Slide the window and drop clients whose timestamp list drained.
        // The client id comes from an attacker-controllable header, so a
        // drained entry that lingers is unbounded memory growth.
        let cutoff = now - WINDOW_SECS;
        requests.retain(|_, timestamps| {
            timestamps.retain(|ts| *ts > cutoff);
            !timestamps.is_empty()
        });

        let timestamps = requests.entry(client_id.to_string()).or_default();
        let count = timestamps.len() as i64;
        let reset_at = timestamps.first().map(|ts| ts + WINDOW_SECS).unwrap_or(now + WINDOW_SECS);
        let allowed = count < self.requests_per_minute as i64;

        if allowed {
            timestamps.push(now);
        }

        RateDecision {
            allowed,
            remaining: self.requests_per_minute as i64 - count - i64::from(allowed),
            reset_at,
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.requests.lock().expect("rate limiter lock").len()
    }
}

fn client_id(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "local".to_string())
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub async fn enforce(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };
    if request.uri().path().ends_with("/health") {
        return next.run(request).await;
    }

    let client = client_id(&request);
    let now = epoch_now();
    let decision = limiter.check(&client, now);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        let retry_after = (decision.reset_at - now).ceil().max(0.0) as u64;
        tracing::warn!(client = %client, retry_after, "Rate limit exceeded");
        let mut response = ApiError::RateLimited { retry_after }.into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
        response
    };

    let headers = response.headers_mut();
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    };
    set("x-ratelimit-limit", limiter.limit().to_string());
    set("x-ratelimit-remaining", decision.remaining.max(0).to_string());
    set("x-ratelimit-reset", (decision.reset_at as i64).to_string());

    response
}
