// crates/server/src/routes/leaderboard.rs
//! GET /leaderboard and GET /leaderboard/me over the cached rankings.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use burntop_core::Period;
use burntop_db::{LeaderboardEntry, LeaderboardSort};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub period: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntryResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub image: Option<String>,
    pub rank: i64,
    pub rank_change: Option<i64>,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub streak_days: i64,
}

impl From<LeaderboardEntry> for LeaderboardEntryResponse {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            user_id: entry.user_id,
            username: entry.username,
            display_name: entry.display_name,
            image: entry.image,
            rank: entry.rank,
            rank_change: entry.rank_change,
            total_tokens: entry.total_tokens,
            total_cost: entry.total_cost,
            streak_days: entry.streak_days,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntryResponse>,
    pub pagination: PaginationMeta,
    pub period: Period,
    pub sort_by: &'static str,
}

fn parse_period(period: Option<&str>) -> ApiResult<Period> {
    period
        .unwrap_or("all")
        .parse()
        .map_err(|e: burntop_core::CoreError| ApiError::Validation(e.to_string()))
}

fn parse_sort(sort_by: Option<&str>) -> ApiResult<LeaderboardSort> {
    let raw = sort_by.unwrap_or("tokens");
    LeaderboardSort::parse(raw).ok_or_else(|| {
        ApiError::Validation(format!(
            "unknown sort_by: {raw:?} (expected one of: tokens, cost, streak)"
        ))
    })
}

/// GET /leaderboard - one page of the cached rankings.
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> ApiResult<Json<LeaderboardResponse>> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let period = parse_period(params.period.as_deref())?;
    let sort = parse_sort(params.sort_by.as_deref())?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::Validation("offset must be non-negative".into()));
    }

    let board = state.db.leaderboard();
    let (entries, has_more) = board.rankings_page(period, sort, limit, offset).await?;
    let total = board.count(period).await?;

    Ok(Json(LeaderboardResponse {
        entries: entries.into_iter().map(Into::into).collect(),
        pagination: PaginationMeta {
            total,
            limit,
            offset,
            has_more,
        },
        period,
        sort_by: sort.as_str(),
    }))
}

/// GET /leaderboard/me - the caller's cached rank for a period.
pub async fn my_rank(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> ApiResult<Json<LeaderboardEntryResponse>> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let period = parse_period(params.period.as_deref())?;
    let entry = state
        .db
        .leaderboard()
        .user_rank(user.id, period)
        .await?
        .ok_or_else(|| ApiError::not_found("Leaderboard entry"))?;
    Ok(Json(entry.into()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/leaderboard/me", get(my_rank))
}
