// crates/server/src/insights.rs
//! Per-user insights: the user's own aggregates joined against the
//! community benchmark for the same period, with percentile rankings.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use burntop_core::{cache_efficiency, Period};
use burntop_db::Database;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{ApiError, ApiResult};

/// Insights view: user stats vs community benchmarks. Percentiles read
/// 0-100 with 100 = top performer; tokens/tools/cache-efficiency treat
/// higher as better, cost treats lower as better.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsView {
    pub id: Uuid,
    pub username: String,
    pub period: Period,

    pub user_total_tokens: i64,
    pub user_total_cost: f64,
    pub user_current_streak: i64,
    pub user_unique_tools: i64,
    pub user_cache_efficiency: Option<f64>,
    pub user_unique_days: i64,

    pub community_avg_tokens: Option<i64>,
    pub community_median_tokens: Option<i64>,
    pub community_avg_cost: Option<f64>,
    pub community_avg_streak: Option<i64>,
    pub community_avg_unique_tools: Option<i64>,
    pub community_avg_cache_efficiency: Option<f64>,
    pub community_total_users: i64,

    pub tokens_percentile: Option<f64>,
    pub cost_percentile: Option<f64>,
    pub streak_percentile: Option<f64>,
    pub tools_percentile: Option<f64>,
    pub cache_efficiency_percentile: Option<f64>,

    pub is_above_average_tokens: bool,
    pub is_above_average_streak: bool,
    pub is_above_average_cache_efficiency: bool,
}

/// Percentile placeholder until per-metric distributions are computed;
/// the streak percentile is the one real number today.
const MEDIAN_PLACEHOLDER: f64 = 50.0;

pub async fn user_insights(db: &Database, user_id: Uuid, period: Period) -> ApiResult<InsightsView> {
    let user = db
        .users()
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let benchmark = db
        .benchmarks()
        .current(period)
        .await?
        .ok_or_else(|| ApiError::not_found("Benchmark"))?;

    let cutoff = period.cutoff(Utc::now().date_naive());
    let totals = db.usage().user_totals(user_id, cutoff).await?;
    let (cache_reads, total_tokens_window) = db.usage().user_cache_stats(user_id, cutoff).await?;

    let current_streak = db
        .streaks()
        .get(user_id)
        .await?
        .map(|row| row.current_streak)
        .unwrap_or(0);

    let user_cache_efficiency = (total_tokens_window > 0).then(|| {
        cache_efficiency(cache_reads, total_tokens_window - cache_reads)
            .to_f64()
            .unwrap_or(0.0)
    });

    let streak_percentile = if current_streak > 0 {
        Some(db.benchmarks().streak_percentile(current_streak).await?)
    } else {
        None
    };

    let user_total_cost = totals.total_cost.to_f64().unwrap_or(0.0);
    let community_avg_cost = benchmark.avg_cost.and_then(|cost| cost.to_f64());

    Ok(InsightsView {
        id: user.id,
        username: user.username,
        period,

        user_total_tokens: totals.total_tokens,
        user_total_cost,
        user_current_streak: current_streak,
        user_unique_tools: totals.unique_tools,
        user_cache_efficiency,
        user_unique_days: totals.unique_days,

        community_avg_tokens: benchmark.avg_tokens,
        community_median_tokens: benchmark.median_tokens,
        community_avg_cost,
        community_avg_streak: benchmark.avg_streak,
        community_avg_unique_tools: benchmark.avg_unique_tools,
        community_avg_cache_efficiency: benchmark.avg_cache_efficiency,
        community_total_users: benchmark.total_users,

        tokens_percentile: (totals.total_tokens > 0).then_some(MEDIAN_PLACEHOLDER),
        cost_percentile: (user_total_cost > 0.0).then_some(MEDIAN_PLACEHOLDER),
        streak_percentile,
        tools_percentile: (totals.unique_tools > 0).then_some(MEDIAN_PLACEHOLDER),
        cache_efficiency_percentile: user_cache_efficiency.map(|_| MEDIAN_PLACEHOLDER),

        is_above_average_tokens: benchmark
            .avg_tokens
            .map(|avg| totals.total_tokens > avg)
            .unwrap_or(false),
        is_above_average_streak: benchmark
            .avg_streak
            .map(|avg| current_streak > avg)
            .unwrap_or(false),
        is_above_average_cache_efficiency: match (user_cache_efficiency, benchmark.avg_cache_efficiency)
        {
            (Some(user), Some(avg)) => user > avg,
            _ => false,
        },
    })
}
