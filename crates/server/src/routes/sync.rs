// crates/server/src/routes/sync.rs
//! POST /sync - ingest one batch of usage messages.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use burntop_core::SyncMessage;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::sync::SyncService;

fn default_machine_id() -> String {
    "default".to_string()
}

/// Sync request payload. Clients send camelCase; snake_case is accepted
/// for older CLI builds.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub version: String,
    pub client: String,
    #[serde(default = "default_machine_id", alias = "machine_id")]
    pub machine_id: String,
    #[serde(alias = "synced_at")]
    pub synced_at: String,
    pub source: String,
    pub messages: Vec<SyncMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatsResponse {
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub achievements_unlocked: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: Option<String>,
    pub messages_received: usize,
    pub messages_synced: usize,
    pub records_processed: usize,
    pub new_records: i64,
    pub updated_records: i64,
    pub stats: SyncStatsResponse,
    /// Achievement rules were removed; the field stays for CLI
    /// compatibility and is always empty.
    pub new_achievements: Vec<serde_json::Value>,
}

/// POST /sync - runs the full ingestion pipeline for the caller.
pub async fn sync(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult<Json<SyncResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let service = SyncService::new(&state.db, state.pricing.clone());
    let outcome = service
        .process_sync(user.id, &request.source, &request.messages, &request.machine_id)
        .await?;

    let message = if outcome.messages_synced == 0 {
        "No new messages to sync".to_string()
    } else {
        format!("Synced {} new messages", outcome.messages_synced)
    };

    Ok(Json(SyncResponse {
        success: true,
        message: Some(message),
        messages_received: outcome.messages_received,
        messages_synced: outcome.messages_synced,
        records_processed: outcome.records_processed,
        new_records: outcome.new_records,
        updated_records: outcome.updated_records,
        stats: SyncStatsResponse {
            total_tokens: outcome.total_tokens,
            total_cost: outcome.total_cost,
            current_streak: outcome.current_streak,
            longest_streak: outcome.longest_streak,
            achievements_unlocked: 0,
        },
        new_achievements: Vec::new(),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sync", post(sync))
}
