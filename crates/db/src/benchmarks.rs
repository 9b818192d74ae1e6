// crates/db/src/benchmarks.rs
//! Community-wide aggregate statistics, one row per period, recomputed
//! hourly. Also the percentile counts backing user insights.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use burntop_core::Period;

use crate::money::{cost_from_raw, cost_to_raw};
use crate::usage::TOTAL_TOKENS_EXPR;
use crate::users::parse_uuid;
use crate::{now_ts, Database, DbResult};

/// One period's community benchmark. Statistic fields are NULL when the
/// period had no active users.
#[derive(Debug, Clone)]
pub struct BenchmarkRow {
    pub period: Period,
    pub total_users: i64,
    pub avg_tokens: Option<i64>,
    pub median_tokens: Option<i64>,
    pub total_community_tokens: Option<i64>,
    pub avg_cost: Option<Decimal>,
    pub avg_streak: Option<i64>,
    pub avg_unique_tools: Option<i64>,
    pub avg_cache_efficiency: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for BenchmarkRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let period: String = row.try_get("period")?;
        Ok(Self {
            period: period
                .parse()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            total_users: row.try_get("total_users")?,
            avg_tokens: row.try_get("avg_tokens")?,
            median_tokens: row.try_get("median_tokens")?,
            total_community_tokens: row.try_get("total_community_tokens")?,
            avg_cost: row
                .try_get::<Option<i64>, _>("avg_cost")?
                .map(cost_from_raw),
            avg_streak: row.try_get("avg_streak")?,
            avg_unique_tools: row.try_get("avg_unique_tools")?,
            avg_cache_efficiency: row.try_get("avg_cache_efficiency")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Per-user aggregates feeding the community statistics.
#[derive(Debug, Clone)]
pub struct UserStatsRow {
    pub user_id: Uuid,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub unique_tools: i64,
    pub unique_days: i64,
}

#[derive(Debug, Clone)]
pub struct BenchmarkStore {
    db: Database,
}

impl BenchmarkStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn current(&self, period: Period) -> DbResult<Option<BenchmarkRow>> {
        let row = sqlx::query_as::<_, BenchmarkRow>(
            "SELECT * FROM community_benchmarks WHERE period = ?",
        )
        .bind(period.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }

    /// Recompute one period's statistics and upsert its row.
    pub async fn compute_and_store(
        &self,
        period: Period,
        today: NaiveDate,
    ) -> DbResult<BenchmarkRow> {
        let cutoff = period.cutoff(today);
        let total_users = self.active_users(cutoff).await?;

        let stats = if total_users == 0 {
            ComputedStats::default()
        } else {
            let per_user = self.per_user_stats(cutoff).await?;

            let mut token_counts: Vec<i64> =
                per_user.iter().map(|row| row.total_tokens).collect();
            token_counts.sort_unstable();
            let n = token_counts.len() as i64;

            let total: i64 = token_counts.iter().sum();
            let cost_sum: Decimal = per_user.iter().map(|row| row.total_cost).sum();
            let tools_sum: i64 = per_user.iter().map(|row| row.unique_tools).sum();

            ComputedStats {
                avg_tokens: Some(total / n),
                // Lower median: the n/2-th order statistic.
                median_tokens: Some(token_counts[token_counts.len() / 2]),
                total_community_tokens: Some(total),
                avg_cost: Some((cost_sum / Decimal::from(n)).round_dp(4)),
                avg_unique_tools: Some(tools_sum / n),
                avg_streak: self
                    .avg_active_streak()
                    .await?
                    .map(|avg| avg.floor() as i64),
                avg_cache_efficiency: self.avg_cache_efficiency(cutoff).await?,
            }
        };

        let now = now_ts();
        sqlx::query(
            "INSERT INTO community_benchmarks \
               (id, period, total_users, avg_tokens, median_tokens, \
                total_community_tokens, avg_cost, avg_streak, avg_unique_tools, \
                avg_cache_efficiency, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(period) DO UPDATE SET \
               total_users = excluded.total_users, \
               avg_tokens = excluded.avg_tokens, \
               median_tokens = excluded.median_tokens, \
               total_community_tokens = excluded.total_community_tokens, \
               avg_cost = excluded.avg_cost, \
               avg_streak = excluded.avg_streak, \
               avg_unique_tools = excluded.avg_unique_tools, \
               avg_cache_efficiency = excluded.avg_cache_efficiency, \
               updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(period.as_str())
        .bind(total_users)
        .bind(stats.avg_tokens)
        .bind(stats.median_tokens)
        .bind(stats.total_community_tokens)
        .bind(stats.avg_cost.map(cost_to_raw))
        .bind(stats.avg_streak)
        .bind(stats.avg_unique_tools)
        .bind(stats.avg_cache_efficiency)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        self.current(period)
            .await?
            .ok_or_else(|| crate::DbError::Validation("benchmark vanished after upsert".into()))
    }

    /// Count of users with any usage in the window.
    pub async fn active_users(&self, cutoff: Option<NaiveDate>) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT user_id) FROM usage_records \
             WHERE (?1 IS NULL OR date >= ?1)",
        )
        .bind(cutoff.map(|d| d.to_string()))
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }

    /// Per-user totals over the window.
    pub async fn per_user_stats(
        &self,
        cutoff: Option<NaiveDate>,
    ) -> DbResult<Vec<UserStatsRow>> {
        let sql = format!(
            "SELECT user_id, \
                    SUM({TOTAL_TOKENS_EXPR}) AS total_tokens, \
                    SUM(cost) AS total_cost, \
                    COUNT(DISTINCT source) AS unique_tools, \
                    COUNT(DISTINCT date) AS unique_days \
             FROM usage_records \
             WHERE (?1 IS NULL OR date >= ?1) \
             GROUP BY user_id"
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff.map(|d| d.to_string()))
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(UserStatsRow {
                    user_id: parse_uuid(row.try_get("user_id")?)?,
                    total_tokens: row.try_get("total_tokens")?,
                    total_cost: cost_from_raw(row.try_get("total_cost")?),
                    unique_tools: row.try_get("unique_tools")?,
                    unique_days: row.try_get("unique_days")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    /// Mean current streak across users with an active streak.
    async fn avg_active_streak(&self) -> DbResult<Option<f64>> {
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT AVG(current_streak) FROM streaks WHERE current_streak > 0",
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }

    /// Mean of per-record cache hit rate, rows with zero tokens excluded
    /// (AVG skips the NULLs NULLIF produces).
    async fn avg_cache_efficiency(&self, cutoff: Option<NaiveDate>) -> DbResult<Option<f64>> {
        let sql = format!(
            "SELECT AVG(cache_read_tokens * 100.0 / NULLIF({TOTAL_TOKENS_EXPR}, 0)) \
             FROM usage_records WHERE (?1 IS NULL OR date >= ?1)"
        );
        let row: (Option<f64>,) = sqlx::query_as(&sql)
            .bind(cutoff.map(|d| d.to_string()))
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.0)
    }

    /// Share of streak rows strictly below `value`, as a percentage with
    /// two fractional digits. 50.0 when there are no streak rows at all.
    pub async fn streak_percentile(&self, value: i64) -> DbResult<f64> {
        let below: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM streaks WHERE current_streak < ?")
                .bind(value)
                .fetch_one(self.db.pool())
                .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM streaks")
            .fetch_one(self.db.pool())
            .await?;

        if total.0 == 0 {
            return Ok(50.0);
        }
        let percentile = below.0 as f64 / total.0 as f64 * 100.0;
        Ok((percentile * 100.0).round() / 100.0)
    }
}

#[derive(Debug, Default)]
struct ComputedStats {
    avg_tokens: Option<i64>,
    median_tokens: Option<i64>,
    total_community_tokens: Option<i64>,
    avg_cost: Option<Decimal>,
    avg_streak: Option<i64>,
    avg_unique_tools: Option<i64>,
    avg_cache_efficiency: Option<f64>,
}
