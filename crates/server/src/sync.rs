// crates/server/src/sync.rs
//! The sync orchestrator: one call per client batch.
//!
//! Pipeline: dedup gate → pricing catalog → (date, model) aggregation →
//! cost per bucket → one-transaction commit of counters + message IDs →
//! streak update. Messages that fail the dedup gate contribute nothing,
//! which is what makes the endpoint idempotent: replaying a batch is a
//! no-op after the first call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use burntop_core::pricing::{calculate_cost, ModelPricing, TokenCounts};
use burntop_core::sync::{MAX_MACHINE_ID_LEN, MAX_SOURCE_LEN};
use burntop_core::SyncMessage;
use burntop_db::{now_ts, Database, DedupStore, PricingHandle, StreakStore, UsageDelta, UsageStore};

use crate::error::{ApiError, ApiResult};

/// Everything a sync response needs to report.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub messages_received: usize,
    pub messages_synced: usize,
    pub records_processed: usize,
    pub new_records: i64,
    pub updated_records: i64,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub current_streak: i64,
    pub longest_streak: i64,
}

/// The orchestrator's collaborators, held explicitly. No service
/// container, no optional variants.
pub struct SyncService {
    dedup: DedupStore,
    usage: UsageStore,
    streaks: StreakStore,
    pricing: Arc<PricingHandle>,
}

impl SyncService {
    pub fn new(db: &Database, pricing: Arc<PricingHandle>) -> Self {
        Self {
            dedup: db.dedup(),
            usage: db.usage(),
            streaks: db.streaks(),
            pricing,
        }
    }

    pub async fn process_sync(
        &self,
        user_id: Uuid,
        source: &str,
        messages: &[SyncMessage],
        machine_id: &str,
    ) -> ApiResult<SyncOutcome> {
        if messages.is_empty() {
            return Err(ApiError::Validation("messages must not be empty".into()));
        }

        let source = source.trim().to_lowercase();
        if source.is_empty() || source.len() > MAX_SOURCE_LEN {
            return Err(ApiError::Validation(format!(
                "source must be 1-{MAX_SOURCE_LEN} characters"
            )));
        }

        let machine_id = match machine_id.trim() {
            "" => "default",
            trimmed => trimmed,
        };
        if machine_id.len() > MAX_MACHINE_ID_LEN {
            return Err(ApiError::Validation(format!(
                "machineId must be at most {MAX_MACHINE_ID_LEN} characters"
            )));
        }

        // One bad message rejects the whole batch; partial success is not
        // a thing this endpoint does.
        for message in messages {
            message.validate()?;
        }

        let messages_received = messages.len();
        let by_id: HashMap<&str, &SyncMessage> = messages
            .iter()
            .map(|message| (message.id.as_str(), message))
            .collect();
        let message_ids: Vec<String> =
            messages.iter().map(|message| message.id.clone()).collect();

        // The idempotence gate: only IDs never seen for (user, source)
        // contribute to totals.
        let new_ids = self.dedup.filter_new(user_id, &source, &message_ids).await?;

        if new_ids.is_empty() {
            tracing::info!(
                user_id = %user_id,
                source = %source,
                messages_received,
                "Sync had no new messages"
            );
            let (current_streak, longest_streak) = self.streak_snapshot(user_id).await?;
            return Ok(SyncOutcome {
                messages_received,
                messages_synced: 0,
                records_processed: 0,
                new_records: 0,
                updated_records: 0,
                total_tokens: 0,
                total_cost: Decimal::ZERO,
                current_streak,
                longest_streak,
            });
        }

        // Stale (or empty) catalogs are fine; an unpriceable model costs
        // zero and still counts tokens.
        let catalog = self.pricing.get().await;

        // Aggregate new messages into (date, model) buckets.
        let mut buckets: BTreeMap<(NaiveDate, String), TokenCounts> = BTreeMap::new();
        for id in &new_ids {
            let message = by_id[id.as_str()];
            let key = (message.date()?, message.model.to_lowercase());
            buckets.entry(key).or_default().add(&message.counts());
        }

        let now = now_ts();
        let mut deltas = Vec::with_capacity(buckets.len());
        for ((date, model), counts) in &buckets {
            let pricing = ModelPricing::for_model(model, &catalog);
            let cost = calculate_cost(counts, &pricing)?;
            deltas.push(UsageDelta {
                user_id,
                date: *date,
                source: source.clone(),
                model: model.clone(),
                machine_id: machine_id.to_string(),
                input_tokens: counts.input_tokens,
                output_tokens: counts.output_tokens,
                cache_read_tokens: counts.cache_read_tokens,
                cache_write_tokens: counts.cache_write_tokens,
                reasoning_tokens: counts.reasoning_tokens,
                cost,
                usage_timestamp: now,
                synced_at: now,
            });
        }

        // Counters and dedup IDs commit together or not at all.
        let counts = self
            .usage
            .commit_sync(user_id, &source, &new_ids, &deltas)
            .await?;

        let total_tokens: i64 = deltas.iter().map(UsageDelta::total_tokens).sum();
        let total_cost: Decimal = deltas.iter().map(|delta| delta.cost).sum();

        // Streak update rides the stored timezone; the latest bucket date
        // is the activity date. This step is retryable independently of
        // the committed counters.
        let latest_date = deltas
            .iter()
            .map(|delta| delta.date)
            .max()
            .expect("non-empty deltas from non-empty new_ids");
        let timezone = self
            .streaks
            .get(user_id)
            .await?
            .map(|row| row.timezone)
            .unwrap_or_else(|| "UTC".to_string());
        let streak = self
            .streaks
            .update_streak(user_id, latest_date, &timezone)
            .await?;

        tracing::info!(
            user_id = %user_id,
            source = %source,
            messages_synced = new_ids.len(),
            records = deltas.len(),
            total_tokens,
            "Sync committed"
        );

        Ok(SyncOutcome {
            messages_received,
            messages_synced: new_ids.len(),
            records_processed: deltas.len(),
            new_records: counts.new_records,
            updated_records: counts.updated_records,
            total_tokens,
            total_cost,
            current_streak: streak.current_streak,
            longest_streak: streak.longest_streak,
        })
    }

    async fn streak_snapshot(&self, user_id: Uuid) -> ApiResult<(i64, i64)> {
        Ok(self
            .streaks
            .get(user_id)
            .await?
            .map(|row| (row.current_streak, row.longest_streak))
            .unwrap_or((0, 0)))
    }
}
