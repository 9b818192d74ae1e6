// crates/server/src/routes/insights.rs
//! GET /insights - the caller's stats against community benchmarks.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use burntop_core::Period;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::insights::{user_insights, InsightsView};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InsightsParams {
    pub period: Option<String>,
}

pub async fn insights(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    params: Result<Query<InsightsParams>, QueryRejection>,
) -> ApiResult<Json<InsightsView>> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let period: Period = params
        .period
        .as_deref()
        .unwrap_or("all")
        .parse()
        .map_err(|e: burntop_core::CoreError| ApiError::Validation(e.to_string()))?;

    let view = user_insights(&state.db, user.id, period).await?;
    Ok(Json(view))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/insights", get(insights))
}
