// crates/server/src/routes/mod.rs
//! API route handlers, all nested under the /api/v1 prefix.

pub mod health;
pub mod insights;
pub mod leaderboard;
pub mod stats;
pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api/v1.
///
/// Routes:
/// - GET  /api/v1/health            - Liveness + database probe
/// - POST /api/v1/sync              - Ingest a usage batch (auth)
/// - GET  /api/v1/leaderboard       - Ranked usage leaderboard
/// - GET  /api/v1/leaderboard/me    - Caller's cached rank (auth)
/// - GET  /api/v1/insights          - User vs community insights (auth)
/// - GET  /api/v1/users/me/stats    - Lifetime usage statistics (auth)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(health::router())
                .merge(sync::router())
                .merge(leaderboard::router())
                .merge(insights::router())
                .merge(stats::router()),
        )
        .with_state(state)
}
