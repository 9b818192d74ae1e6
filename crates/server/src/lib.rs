// crates/server/src/lib.rs
//! Burntop server library.
//!
//! Axum HTTP surface over the burntop core: the sync ingestion endpoint,
//! leaderboard and insights reads, and the background jobs that keep the
//! derived caches fresh.

pub mod auth;
pub mod config;
pub mod error;
pub mod insights;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod sync;

pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorEnvelope};
pub use routes::api_routes;
pub use state::AppState;
pub use sync::{SyncOutcome, SyncService};

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// CORS: the configured frontend origin plus localhost for development.
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let frontend = frontend_url.trim_end_matches('/').to_string();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _req_parts: &axum::http::request::Parts| {
                let Ok(origin) = origin.to_str() else {
                    return false;
                };
                origin == frontend
                    || origin.starts_with("http://localhost:")
                    || origin.starts_with("http://127.0.0.1:")
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the Axum application with all routes and middleware.
///
/// Middleware, outermost first: correlation IDs (so every response,
/// including a rate-limit rejection, carries one), request tracing, CORS,
/// then rate limiting.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.frontend_url);
    api_routes(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::rate_limit::enforce,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::correlation::propagate))
}
