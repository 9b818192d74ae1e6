// crates/db/src/leaderboard.rs
//! Leaderboard cache: periodic ranking rebuild plus the read path.
//!
//! The cache is keyed (user_id, period) and wholly replaced by the
//! minutely job. Ranks are dense 1..N, ordered by total tokens; the
//! ORDER BY repeats the full token-sum expression rather than an alias so
//! ordering stays deterministic across backends.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use burntop_core::Period;

use crate::money::cost_from_raw;
use crate::usage::TOTAL_TOKENS_EXPR;
use crate::users::parse_uuid;
use crate::{now_ts, Database, DbResult};

/// How many users a period's cache holds.
const RANKING_LIMIT: i64 = 1000;

/// Sort order for leaderboard reads. The cache is always *ranked* by
/// tokens; cost/streak sorts reorder the cached rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardSort {
    Tokens,
    Cost,
    Streak,
}

impl LeaderboardSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardSort::Tokens => "tokens",
            LeaderboardSort::Cost => "cost",
            LeaderboardSort::Streak => "streak",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tokens" => Some(LeaderboardSort::Tokens),
            "cost" => Some(LeaderboardSort::Cost),
            "streak" => Some(LeaderboardSort::Streak),
            _ => None,
        }
    }
}

/// One row of the aggregation feeding a rebuild.
#[derive(Debug, Clone)]
struct RankingRow {
    user_id: Uuid,
    total_tokens: i64,
    total_cost_raw: i64,
}

/// A cached leaderboard row joined with its (non-deleted) user.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
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

impl<'r> sqlx::FromRow<'r, SqliteRow> for LeaderboardEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: parse_uuid(row.try_get("user_id")?)?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            image: row.try_get("image")?,
            rank: row.try_get("rank")?,
            rank_change: row.try_get("rank_change")?,
            total_tokens: row.try_get("total_tokens")?,
            total_cost: cost_from_raw(row.try_get::<Option<i64>, _>("total_cost")?.unwrap_or(0)),
            streak_days: row.try_get::<Option<i64>, _>("streak_days")?.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LeaderboardStore {
    db: Database,
}

impl LeaderboardStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Recompute one period's rankings and upsert them into the cache.
    /// Returns the number of cached entries.
    pub async fn rebuild_period(&self, period: Period, today: NaiveDate) -> DbResult<usize> {
        let cutoff = period.cutoff(today);
        let rows = self.ranking_data(cutoff).await?;

        let user_ids: Vec<Uuid> = rows.iter().map(|r| r.user_id).collect();
        let streaks = self.streaks_for(&user_ids).await?;
        let previous = self.previous_ranks(period).await?;

        let now = now_ts();
        // 10 binds per row.
        for (offset, chunk) in rows.chunks(50).enumerate() {
            let placeholders =
                vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO leaderboard_cache \
                   (id, user_id, period, rank, total_tokens, total_cost, \
                    streak_days, rank_change, created_at, updated_at) \
                 VALUES {placeholders} \
                 ON CONFLICT(user_id, period) DO UPDATE SET \
                   rank = excluded.rank, \
                   total_tokens = excluded.total_tokens, \
                   total_cost = excluded.total_cost, \
                   streak_days = excluded.streak_days, \
                   rank_change = excluded.rank_change, \
                   updated_at = excluded.updated_at"
            );
            let mut query = sqlx::query(&sql);
            for (i, row) in chunk.iter().enumerate() {
                let rank = (offset * 50 + i + 1) as i64;
                let rank_change = previous.get(&row.user_id).map(|prev| prev - rank);
                query = query
                    .bind(Uuid::new_v4().to_string())
                    .bind(row.user_id.to_string())
                    .bind(period.as_str())
                    .bind(rank)
                    .bind(row.total_tokens)
                    .bind(row.total_cost_raw)
                    .bind(streaks.get(&row.user_id).copied().unwrap_or(0))
                    .bind(rank_change)
                    .bind(now)
                    .bind(now);
            }
            query.execute(self.db.pool()).await?;
        }

        // The cache is a whole replacement: drop rows the rebuild didn't
        // touch (users who fell out of the window or were soft-deleted).
        sqlx::query("DELETE FROM leaderboard_cache WHERE period = ? AND updated_at < ?")
            .bind(period.as_str())
            .bind(now)
            .execute(self.db.pool())
            .await?;

        Ok(rows.len())
    }

    /// Aggregate (user, total tokens, total cost) over the window, ordered
    /// by the repeated token expression, capped at RANKING_LIMIT.
    async fn ranking_data(&self, cutoff: Option<NaiveDate>) -> DbResult<Vec<RankingRow>> {
        let sql = format!(
            "SELECT user_id, \
                    SUM({TOTAL_TOKENS_EXPR}) AS total_tokens, \
                    SUM(cost) AS total_cost \
             FROM usage_records \
             WHERE (?1 IS NULL OR date >= ?1) \
             GROUP BY user_id \
             ORDER BY SUM({TOTAL_TOKENS_EXPR}) DESC \
             LIMIT {RANKING_LIMIT}"
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff.map(|d| d.to_string()))
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RankingRow {
                    user_id: parse_uuid(row.try_get("user_id")?)?,
                    total_tokens: row.try_get("total_tokens")?,
                    total_cost_raw: row.try_get("total_cost")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(Into::into)
    }

    async fn previous_ranks(&self, period: Period) -> DbResult<HashMap<Uuid, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT user_id, rank FROM leaderboard_cache WHERE period = ?")
                .bind(period.as_str())
                .fetch_all(self.db.pool())
                .await?;
        let mut map = HashMap::with_capacity(rows.len());
        for (user_id, rank) in rows {
            map.insert(parse_uuid(user_id)?, rank);
        }
        Ok(map)
    }

    async fn streaks_for(&self, user_ids: &[Uuid]) -> DbResult<HashMap<Uuid, i64>> {
        let mut map = HashMap::with_capacity(user_ids.len());
        for chunk in user_ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT user_id, current_streak FROM streaks WHERE user_id IN ({placeholders})"
            );
            let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
            for id in chunk {
                query = query.bind(id.to_string());
            }
            for (user_id, streak) in query.fetch_all(self.db.pool()).await? {
                map.insert(parse_uuid(user_id)?, streak);
            }
        }
        Ok(map)
    }

    /// One page of rankings joined with visible users.
    pub async fn rankings_page(
        &self,
        period: Period,
        sort: LeaderboardSort,
        limit: i64,
        offset: i64,
    ) -> DbResult<(Vec<LeaderboardEntry>, bool)> {
        let order = match sort {
            LeaderboardSort::Tokens => "l.rank ASC",
            LeaderboardSort::Cost => "l.total_cost DESC, l.rank ASC",
            LeaderboardSort::Streak => "l.streak_days DESC, l.rank ASC",
        };
        let sql = format!(
            "SELECT l.user_id, l.rank, l.rank_change, l.total_tokens, l.total_cost, \
                    l.streak_days, u.username, u.display_name, u.image \
             FROM leaderboard_cache l \
             JOIN users u ON u.id = l.user_id AND u.deleted_at IS NULL \
             WHERE l.period = ? \
             ORDER BY {order} \
             LIMIT ? OFFSET ?"
        );
        // Fetch one extra row to learn whether another page exists.
        let mut entries = sqlx::query_as::<_, LeaderboardEntry>(&sql)
            .bind(period.as_str())
            .bind(limit + 1)
            .bind(offset)
            .fetch_all(self.db.pool())
            .await?;
        let has_more = entries.len() as i64 > limit;
        entries.truncate(limit as usize);
        Ok((entries, has_more))
    }

    pub async fn count(&self, period: Period) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM leaderboard_cache l \
             JOIN users u ON u.id = l.user_id AND u.deleted_at IS NULL \
             WHERE l.period = ?",
        )
        .bind(period.as_str())
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.0)
    }

    pub async fn user_rank(
        &self,
        user_id: Uuid,
        period: Period,
    ) -> DbResult<Option<LeaderboardEntry>> {
        let entry = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT l.user_id, l.rank, l.rank_change, l.total_tokens, l.total_cost, \
                    l.streak_days, u.username, u.display_name, u.image \
             FROM leaderboard_cache l \
             JOIN users u ON u.id = l.user_id AND u.deleted_at IS NULL \
             WHERE l.user_id = ? AND l.period = ?",
        )
        .bind(user_id.to_string())
        .bind(period.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(entry)
    }
}
