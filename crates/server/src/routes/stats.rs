// crates/server/src/routes/stats.rs
//! GET /users/me/stats - lifetime usage statistics for the caller.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use burntop_core::cache_efficiency;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsageStatsResponse {
    pub total_tokens: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub total_cache_write_tokens: i64,
    pub total_reasoning_tokens: i64,
    pub total_cost: Decimal,
    /// Share of input-side tokens served from cache, 0-100.
    pub cache_efficiency: Decimal,
    pub unique_models: i64,
    pub unique_sources: i64,
    pub total_days: i64,
    pub first_usage_date: Option<NaiveDate>,
    pub last_usage_date: Option<NaiveDate>,
    pub current_streak: i64,
    pub longest_streak: i64,
}

pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<UsageStatsResponse>> {
    let stats = state.db.usage().user_stats(user.id).await?;
    let streak = state.db.streaks().get(user.id).await?;
    let (current_streak, longest_streak) = streak
        .map(|row| (row.current_streak, row.longest_streak))
        .unwrap_or((0, 0));

    Ok(Json(UsageStatsResponse {
        total_tokens: stats.total_tokens,
        total_input_tokens: stats.total_input_tokens,
        total_output_tokens: stats.total_output_tokens,
        total_cache_read_tokens: stats.total_cache_read_tokens,
        total_cache_write_tokens: stats.total_cache_write_tokens,
        total_reasoning_tokens: stats.total_reasoning_tokens,
        total_cost: stats.total_cost,
        cache_efficiency: cache_efficiency(
            stats.total_cache_read_tokens,
            stats.total_input_tokens,
        ),
        unique_models: stats.unique_models,
        unique_sources: stats.unique_sources,
        total_days: stats.total_days,
        first_usage_date: stats.first_usage_date,
        last_usage_date: stats.last_usage_date,
        current_streak,
        longest_streak,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/users/me/stats", get(my_stats))
}
