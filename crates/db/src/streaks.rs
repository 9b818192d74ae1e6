// crates/db/src/streaks.rs
//! Per-user activity streaks.
//!
//! One row per user. Date arithmetic happens in the user's stored IANA
//! timezone; an invalid timezone degrades silently to UTC.

use chrono::{NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use burntop_core::streak;

use crate::users::parse_uuid;
use crate::{now_ts, Database, DbResult};

/// Local hour after which an inactive streak counts as at risk.
pub const DEFAULT_AT_RISK_HOUR: u32 = 22;

#[derive(Debug, Clone)]
pub struct StreakRow {
    pub user_id: Uuid,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_active_date: Option<NaiveDate>,
    pub timezone: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StreakRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let last: Option<String> = row.try_get("last_active_date")?;
        Ok(Self {
            user_id: parse_uuid(row.try_get("user_id")?)?,
            current_streak: row.try_get("current_streak")?,
            longest_streak: row.try_get("longest_streak")?,
            last_active_date: last.and_then(|d| d.parse().ok()),
            timezone: row.try_get("timezone")?,
        })
    }
}

/// (local date, local hour) right now in the given timezone, UTC when the
/// name doesn't parse.
fn local_now(tz_name: &str) -> (NaiveDate, u32) {
    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let now = Utc::now().with_timezone(&tz);
    (now.date_naive(), now.hour())
}

#[derive(Debug, Clone)]
pub struct StreakStore {
    db: Database,
}

impl StreakStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: Uuid) -> DbResult<Option<StreakRow>> {
        let row = sqlx::query_as::<_, StreakRow>("SELECT * FROM streaks WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    /// Fetch the user's streak row, creating a zeroed one on first
    /// activity. A changed timezone is persisted on the way through.
    pub async fn get_or_create(&self, user_id: Uuid, timezone: &str) -> DbResult<StreakRow> {
        sqlx::query(
            "INSERT OR IGNORE INTO streaks (id, user_id, timezone) VALUES (?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(timezone)
        .execute(self.db.pool())
        .await?;

        let mut row = self
            .get(user_id)
            .await?
            .expect("streak row exists after insert-or-ignore");

        if row.timezone != timezone {
            sqlx::query("UPDATE streaks SET timezone = ?, updated_at = ? WHERE user_id = ?")
                .bind(timezone)
                .bind(now_ts())
                .bind(user_id.to_string())
                .execute(self.db.pool())
                .await?;
            row.timezone = timezone.to_string();
        }

        Ok(row)
    }

    /// Apply one activity date to the user's streak and persist the result.
    pub async fn update_streak(
        &self,
        user_id: Uuid,
        activity_date: NaiveDate,
        timezone: &str,
    ) -> DbResult<StreakRow> {
        let row = self.get_or_create(user_id, timezone).await?;

        let (current, longest) = streak::advance(
            row.current_streak,
            row.longest_streak,
            row.last_active_date,
            activity_date,
        );
        sqlx::query(
            "UPDATE streaks SET current_streak = ?, longest_streak = ?, \
             last_active_date = ?, timezone = ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(current)
        .bind(longest)
        .bind(activity_date.to_string())
        .bind(timezone)
        .bind(now_ts())
        .bind(user_id.to_string())
        .execute(self.db.pool())
        .await?;

        Ok(StreakRow {
            user_id,
            current_streak: current,
            longest_streak: longest,
            last_active_date: Some(activity_date),
            timezone: timezone.to_string(),
        })
    }

    /// True when the user's active streak has lapsed (more than one day
    /// since last activity, measured in their timezone).
    pub async fn check_break(&self, user_id: Uuid) -> DbResult<bool> {
        let Some(row) = self.get(user_id).await? else {
            return Ok(false);
        };
        let (today, _) = local_now(&row.timezone);
        Ok(streak::is_broken(row.current_streak, row.last_active_date, today))
    }

    /// Streaks in danger of breaking: active, not yet active today in the
    /// user's timezone, and past `hour_threshold` locally.
    pub async fn at_risk(&self, hour_threshold: u32) -> DbResult<Vec<StreakRow>> {
        let rows = sqlx::query_as::<_, StreakRow>(
            "SELECT * FROM streaks \
             WHERE current_streak > 0 AND last_active_date IS NOT NULL",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| {
                let (today, hour) = local_now(&row.timezone);
                row.last_active_date
                    .map(|last| last < today && hour >= hour_threshold)
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewUser;

    async fn db_with_user() -> (Database, Uuid) {
        let db = Database::new_in_memory().await.unwrap();
        let user = db
            .users()
            .create(&NewUser {
                email: "dev@example.com".into(),
                username: "dev".into(),
                display_name: None,
            })
            .await
            .unwrap();
        (db, user.id)
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn first_activity_creates_the_row() {
        let (db, user) = db_with_user().await;
        let row = db
            .streaks()
            .update_streak(user, d("2024-01-15"), "UTC")
            .await
            .unwrap();
        assert_eq!((row.current_streak, row.longest_streak), (1, 1));
        assert_eq!(row.last_active_date, Some(d("2024-01-15")));
    }

    #[tokio::test]
    async fn consecutive_days_extend_and_persist() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        store.update_streak(user, d("2024-01-15"), "UTC").await.unwrap();
        store.update_streak(user, d("2024-01-16"), "UTC").await.unwrap();
        let row = store.update_streak(user, d("2024-01-17"), "UTC").await.unwrap();
        assert_eq!((row.current_streak, row.longest_streak), (3, 3));

        // Gap resets current, longest survives in storage.
        let row = store.update_streak(user, d("2024-01-20"), "UTC").await.unwrap();
        assert_eq!((row.current_streak, row.longest_streak), (1, 3));
        let stored = store.get(user).await.unwrap().unwrap();
        assert_eq!((stored.current_streak, stored.longest_streak), (1, 3));
    }

    #[tokio::test]
    async fn month_boundary_continuation() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        // Seed current=20, longest=25 with last activity on Jan 31.
        sqlx::query(
            "INSERT INTO streaks (id, user_id, current_streak, longest_streak, last_active_date) \
             VALUES (?, ?, 20, 25, '2024-01-31')",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user.to_string())
        .execute(db.pool())
        .await
        .unwrap();

        let row = store.update_streak(user, d("2024-02-01"), "UTC").await.unwrap();
        assert_eq!((row.current_streak, row.longest_streak), (21, 25));
    }

    #[tokio::test]
    async fn timezone_change_is_stored() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        store.update_streak(user, d("2024-01-15"), "UTC").await.unwrap();
        let row = store
            .update_streak(user, d("2024-01-16"), "America/New_York")
            .await
            .unwrap();
        assert_eq!(row.timezone, "America/New_York");
        let stored = store.get(user).await.unwrap().unwrap();
        assert_eq!(stored.timezone, "America/New_York");
    }

    #[tokio::test]
    async fn check_break_reflects_gap() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        // Active yesterday (in UTC): not broken.
        let yesterday = Utc::now().date_naive() - chrono::Duration::days(1);
        store.update_streak(user, yesterday, "UTC").await.unwrap();
        assert!(!store.check_break(user).await.unwrap());

        // Rewind last_active_date three days: broken.
        let stale = Utc::now().date_naive() - chrono::Duration::days(3);
        sqlx::query("UPDATE streaks SET last_active_date = ? WHERE user_id = ?")
            .bind(stale.to_string())
            .bind(user.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        assert!(store.check_break(user).await.unwrap());
    }

    #[tokio::test]
    async fn at_risk_scans_active_stale_streaks() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        let two_days_ago = Utc::now().date_naive() - chrono::Duration::days(2);
        store.update_streak(user, two_days_ago, "UTC").await.unwrap();

        // Threshold 0: any local hour qualifies, so the stale streak shows up.
        let rows = store.at_risk(0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, user);

        // Threshold past any clock reading: nothing qualifies.
        let rows = store.at_risk(24).await.unwrap();
        assert!(rows.is_empty());

        // Active today: not at risk at any threshold.
        store
            .update_streak(user, Utc::now().date_naive(), "UTC")
            .await
            .unwrap();
        let rows = store.at_risk(0).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn invalid_timezone_degrades_to_utc() {
        let (db, user) = db_with_user().await;
        let store = db.streaks();
        store
            .update_streak(user, d("2024-01-15"), "Not/AZone")
            .await
            .unwrap();
        // check_break parses the stored junk timezone and must not panic.
        let _ = store.check_break(user).await.unwrap();
    }
}
