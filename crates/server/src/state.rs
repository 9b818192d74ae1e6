// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;

use burntop_db::{Database, PricingHandle};

use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Database handle; per-concern stores hang off it.
    pub db: Database,
    /// Process-wide pricing catalog (disk cache + hourly refresh).
    pub pricing: Arc<PricingHandle>,
    /// Present only when rate limiting is enabled in config.
    pub rate_limiter: Option<RateLimiter>,
    pub config: Config,
}

impl AppState {
    /// Create application state wrapped in an Arc for sharing.
    pub fn new(db: Database, config: Config) -> Arc<Self> {
        let pricing = Arc::new(PricingHandle::new(
            config.pricing_url.clone(),
            burntop_db::pricing_cache::default_cache_path(),
        ));
        Self::with_pricing(db, config, pricing)
    }

    /// Create with an externally-provided pricing handle (tests point it
    /// at a mock or unreachable source so nothing leaves the process).
    pub fn with_pricing(db: Database, config: Config, pricing: Arc<PricingHandle>) -> Arc<Self> {
        let rate_limiter = (config.rate_limit_per_minute > 0)
            .then(|| RateLimiter::new(config.rate_limit_per_minute));
        Arc::new(Self {
            db,
            pricing,
            rate_limiter,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_follows_config() {
        let db = Database::new_in_memory().await.expect("in-memory DB");
        let state = AppState::new(db.clone(), Config::default());
        assert!(state.rate_limiter.is_none());

        let mut config = Config::default();
        config.rate_limit_per_minute = 60;
        let state = AppState::new(db, config);
        assert!(state.rate_limiter.is_some());
    }
}
