// crates/db/src/usage.rs
//! Daily usage records: the accumulating upsert engine and the aggregate
//! queries built on top of it.
//!
//! The bucket key is (user_id, date, source, model, machine_id). An upsert
//! either inserts the bucket or ADDs every token counter and the cost to
//! the stored row in a single `ON CONFLICT DO UPDATE` statement, never a
//! read-modify-write in application code, so concurrent syncs interleave
//! safely and every delta lands exactly once.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::money::{cost_from_raw, cost_to_raw};
use crate::users::parse_uuid;
use crate::{dedup, now_ts, Database, DbResult};

/// Token-sum expression shared by every aggregate query. Repeated verbatim
/// in ORDER BY clauses (never via an alias) so ordering is deterministic.
pub(crate) const TOTAL_TOKENS_EXPR: &str = "input_tokens + output_tokens \
     + COALESCE(cache_read_tokens, 0) + COALESCE(cache_write_tokens, 0) \
     + COALESCE(reasoning_tokens, 0)";

/// One bucket's contribution to the daily totals.
#[derive(Debug, Clone)]
pub struct UsageDelta {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub source: String,
    pub model: String,
    pub machine_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub reasoning_tokens: i64,
    pub cost: Decimal,
    pub usage_timestamp: i64,
    pub synced_at: i64,
}

impl UsageDelta {
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_tokens
            + self.cache_write_tokens
            + self.reasoning_tokens
    }

    fn key(&self) -> (String, String, String, String, String) {
        (
            self.user_id.to_string(),
            self.date.to_string(),
            self.source.clone(),
            self.model.clone(),
            self.machine_id.clone(),
        )
    }
}

/// New-vs-updated breakdown of one bulk upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertCounts {
    pub new_records: i64,
    pub updated_records: i64,
}

/// A stored usage record, cost decoded back into USD.
#[derive(Debug, Clone)]
pub struct UsageRecordRow {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub source: String,
    pub model: String,
    pub machine_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub reasoning_tokens: i64,
    pub cost: Decimal,
    pub usage_timestamp: Option<i64>,
    pub synced_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for UsageRecordRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let date: String = row.try_get("date")?;
        Ok(Self {
            user_id: parse_uuid(row.try_get("user_id")?)?,
            date: date.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            source: row.try_get("source")?,
            model: row.try_get("model")?,
            machine_id: row.try_get("machine_id")?,
            input_tokens: row.try_get("input_tokens")?,
            output_tokens: row.try_get("output_tokens")?,
            cache_read_tokens: row.try_get("cache_read_tokens")?,
            cache_write_tokens: row.try_get("cache_write_tokens")?,
            reasoning_tokens: row.try_get("reasoning_tokens")?,
            cost: cost_from_raw(row.try_get("cost")?),
            usage_timestamp: row.try_get("usage_timestamp")?,
            synced_at: row.try_get("synced_at")?,
        })
    }
}

/// Per-period aggregates for one user.
#[derive(Debug, Clone)]
pub struct UserTotals {
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub unique_tools: i64,
    pub unique_days: i64,
}

/// Lifetime usage statistics for the stats endpoint.
#[derive(Debug, Clone)]
pub struct UserStats {
    pub total_tokens: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub total_cache_write_tokens: i64,
    pub total_reasoning_tokens: i64,
    pub total_cost: Decimal,
    pub unique_models: i64,
    pub unique_sources: i64,
    pub total_days: i64,
    pub first_usage_date: Option<NaiveDate>,
    pub last_usage_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct UsageStore {
    db: Database,
}

impl UsageStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Commit one sync batch: upsert the usage deltas AND record the new
    /// message IDs in a single transaction, so a failure leaves the dedup
    /// store and the daily records consistent with each other.
    pub async fn commit_sync(
        &self,
        user_id: Uuid,
        source: &str,
        new_message_ids: &[String],
        deltas: &[UsageDelta],
    ) -> DbResult<UpsertCounts> {
        let mut tx = self.db.pool().begin().await?;
        let counts = upsert_deltas(&mut tx, deltas).await?;
        dedup::insert_ids(&mut tx, user_id, source, new_message_ids, now_ts()).await?;
        tx.commit().await?;
        Ok(counts)
    }

    /// Bulk accumulating upsert without the dedup leg (jobs, tests,
    /// backfills).
    pub async fn upsert_daily(&self, deltas: &[UsageDelta]) -> DbResult<UpsertCounts> {
        let mut tx = self.db.pool().begin().await?;
        let counts = upsert_deltas(&mut tx, deltas).await?;
        tx.commit().await?;
        Ok(counts)
    }

    /// Period-scoped totals for one user.
    pub async fn user_totals(
        &self,
        user_id: Uuid,
        cutoff: Option<NaiveDate>,
    ) -> DbResult<UserTotals> {
        let sql = format!(
            "SELECT COALESCE(SUM({TOTAL_TOKENS_EXPR}), 0) AS total_tokens, \
                    COALESCE(SUM(cost), 0) AS total_cost, \
                    COUNT(DISTINCT source) AS unique_tools, \
                    COUNT(DISTINCT date) AS unique_days \
             FROM usage_records \
             WHERE user_id = ?1 AND (?2 IS NULL OR date >= ?2)"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(cutoff.map(|d| d.to_string()))
            .fetch_one(self.db.pool())
            .await?;
        Ok(UserTotals {
            total_tokens: row.try_get("total_tokens")?,
            total_cost: cost_from_raw(row.try_get("total_cost")?),
            unique_tools: row.try_get("unique_tools")?,
            unique_days: row.try_get("unique_days")?,
        })
    }

    /// (cache_read_tokens, all tokens) for one user in a window; feeds the
    /// cache-efficiency figure on insights.
    pub async fn user_cache_stats(
        &self,
        user_id: Uuid,
        cutoff: Option<NaiveDate>,
    ) -> DbResult<(i64, i64)> {
        let sql = format!(
            "SELECT COALESCE(SUM(cache_read_tokens), 0) AS cache_reads, \
                    COALESCE(SUM({TOTAL_TOKENS_EXPR}), 0) AS total_tokens \
             FROM usage_records \
             WHERE user_id = ?1 AND (?2 IS NULL OR date >= ?2)"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(cutoff.map(|d| d.to_string()))
            .fetch_one(self.db.pool())
            .await?;
        Ok((row.try_get("cache_reads")?, row.try_get("total_tokens")?))
    }

    /// Lifetime statistics for the stats endpoint.
    pub async fn user_stats(&self, user_id: Uuid) -> DbResult<UserStats> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(input_tokens), 0) AS input, \
                    COALESCE(SUM(output_tokens), 0) AS output, \
                    COALESCE(SUM(cache_read_tokens), 0) AS cache_read, \
                    COALESCE(SUM(cache_write_tokens), 0) AS cache_write, \
                    COALESCE(SUM(reasoning_tokens), 0) AS reasoning, \
                    COALESCE(SUM(cost), 0) AS total_cost, \
                    COUNT(DISTINCT model) AS unique_models, \
                    COUNT(DISTINCT source) AS unique_sources, \
                    COUNT(DISTINCT date) AS total_days, \
                    MIN(date) AS first_date, \
                    MAX(date) AS last_date \
             FROM usage_records WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_one(self.db.pool())
        .await?;

        let parse_date = |text: Option<String>| text.and_then(|d| d.parse().ok());
        let input: i64 = row.try_get("input")?;
        let output: i64 = row.try_get("output")?;
        let cache_read: i64 = row.try_get("cache_read")?;
        let cache_write: i64 = row.try_get("cache_write")?;
        let reasoning: i64 = row.try_get("reasoning")?;

        Ok(UserStats {
            total_tokens: input + output + cache_read + cache_write + reasoning,
            total_input_tokens: input,
            total_output_tokens: output,
            total_cache_read_tokens: cache_read,
            total_cache_write_tokens: cache_write,
            total_reasoning_tokens: reasoning,
            total_cost: cost_from_raw(row.try_get("total_cost")?),
            unique_models: row.try_get("unique_models")?,
            unique_sources: row.try_get("unique_sources")?,
            total_days: row.try_get("total_days")?,
            first_usage_date: parse_date(row.try_get("first_date")?),
            last_usage_date: parse_date(row.try_get("last_date")?),
        })
    }

    /// All stored records for a user, newest date first.
    pub async fn records_for_user(&self, user_id: Uuid) -> DbResult<Vec<UsageRecordRow>> {
        let rows = sqlx::query_as::<_, UsageRecordRow>(
            "SELECT * FROM usage_records WHERE user_id = ? \
             ORDER BY date DESC, source, model, machine_id",
        )
        .bind(user_id.to_string())
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }
}

/// Pre-check which bucket keys already exist, then upsert every delta.
/// The counts contract: new + updated == deltas.len().
async fn upsert_deltas(
    conn: &mut SqliteConnection,
    deltas: &[UsageDelta],
) -> DbResult<UpsertCounts> {
    if deltas.is_empty() {
        return Ok(UpsertCounts {
            new_records: 0,
            updated_records: 0,
        });
    }

    let existing = existing_keys(&mut *conn, deltas).await?;
    let mut counts = UpsertCounts {
        new_records: 0,
        updated_records: 0,
    };
    for delta in deltas {
        if existing.contains(&delta.key()) {
            counts.updated_records += 1;
        } else {
            counts.new_records += 1;
        }
    }

    // 16 binds per row.
    for chunk in deltas.chunks(30) {
        let placeholders =
            vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT INTO usage_records \
               (id, user_id, date, source, model, machine_id, \
                input_tokens, output_tokens, cache_read_tokens, cache_write_tokens, \
                reasoning_tokens, cost, usage_timestamp, synced_at, created_at, updated_at) \
             VALUES {placeholders} \
             ON CONFLICT(user_id, date, source, model, machine_id) DO UPDATE SET \
               input_tokens = input_tokens + excluded.input_tokens, \
               output_tokens = output_tokens + excluded.output_tokens, \
               cache_read_tokens = cache_read_tokens + excluded.cache_read_tokens, \
               cache_write_tokens = cache_write_tokens + excluded.cache_write_tokens, \
               reasoning_tokens = reasoning_tokens + excluded.reasoning_tokens, \
               cost = cost + excluded.cost, \
               usage_timestamp = excluded.usage_timestamp, \
               synced_at = excluded.synced_at, \
               updated_at = excluded.updated_at"
        );
        let now = now_ts();
        let mut query = sqlx::query(&sql);
        for delta in chunk {
            query = query
                .bind(Uuid::new_v4().to_string())
                .bind(delta.user_id.to_string())
                .bind(delta.date.to_string())
                .bind(&delta.source)
                .bind(&delta.model)
                .bind(&delta.machine_id)
                .bind(delta.input_tokens)
                .bind(delta.output_tokens)
                .bind(delta.cache_read_tokens)
                .bind(delta.cache_write_tokens)
                .bind(delta.reasoning_tokens)
                .bind(cost_to_raw(delta.cost))
                .bind(delta.usage_timestamp)
                .bind(delta.synced_at)
                .bind(now)
                .bind(now);
        }
        query.execute(&mut *conn).await?;
    }

    Ok(counts)
}

async fn existing_keys(
    conn: &mut SqliteConnection,
    deltas: &[UsageDelta],
) -> DbResult<HashSet<(String, String, String, String, String)>> {
    let mut existing = HashSet::new();
    // 5 binds per key.
    for chunk in deltas.chunks(100) {
        let condition = vec![
            "(user_id = ? AND date = ? AND source = ? AND model = ? AND machine_id = ?)";
            chunk.len()
        ]
        .join(" OR ");
        let sql = format!(
            "SELECT user_id, date, source, model, machine_id FROM usage_records WHERE {condition}"
        );
        let mut query = sqlx::query(&sql);
        for delta in chunk {
            query = query
                .bind(delta.user_id.to_string())
                .bind(delta.date.to_string())
                .bind(&delta.source)
                .bind(&delta.model)
                .bind(&delta.machine_id);
        }
        let rows = query.fetch_all(&mut *conn).await?;
        for row in rows {
            existing.insert((
                row.try_get("user_id")?,
                row.try_get("date")?,
                row.try_get("source")?,
                row.try_get("model")?,
                row.try_get("machine_id")?,
            ));
        }
    }
    Ok(existing)
}
