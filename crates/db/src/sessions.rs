// crates/db/src/sessions.rs
//! Bearer-token sessions. The account system that mints these lives
//! outside the core; the pipeline only needs token → user resolution.

use uuid::Uuid;

use crate::users::parse_uuid;
use crate::{now_ts, Database, DbResult};

#[derive(Debug, Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: Uuid, token: &str, expires_at: i64) -> DbResult<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id.to_string())
            .bind(expires_at)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Resolve a bearer token to its (non-deleted) user. Expired or unknown
    /// tokens resolve to `None`.
    pub async fn user_for_token(&self, token: &str) -> DbResult<Option<Uuid>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"SELECT s.user_id
               FROM sessions s
               JOIN users u ON u.id = s.user_id AND u.deleted_at IS NULL
               WHERE s.token = ? AND s.expires_at > ?"#,
        )
        .bind(token)
        .bind(now_ts())
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some((id,)) => Ok(Some(parse_uuid(id)?)),
            None => Ok(None),
        }
    }
}
