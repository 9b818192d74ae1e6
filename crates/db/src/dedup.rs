// crates/db/src/dedup.rs
//! Message-level deduplication.
//!
//! Each (user, source, message_id) triple is recorded exactly once; the
//! unique constraint plus INSERT OR IGNORE makes insertion idempotent
//! under concurrent retries. Batches are chunked to stay under SQLite's
//! bind-parameter limit.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{now_ts, Database, DbResult};

/// Bind-parameter budget per statement; SQLite's default ceiling is 999.
const BIND_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct DedupStore {
    db: Database,
}

impl DedupStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the subset of `message_ids` not yet recorded for this
    /// (user, source), first occurrence order preserved, duplicates within
    /// the batch collapsed. Ordering relative to the database is not
    /// guaranteed and callers must not rely on it.
    pub async fn filter_new(
        &self,
        user_id: Uuid,
        source: &str,
        message_ids: &[String],
    ) -> DbResult<Vec<String>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let user = user_id.to_string();
        let mut existing: HashSet<String> = HashSet::new();
        for chunk in message_ids.chunks(BIND_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT message_id FROM synced_message_ids \
                 WHERE user_id = ? AND source = ? AND message_id IN ({placeholders})"
            );
            let mut query = sqlx::query_scalar::<_, String>(&sql).bind(&user).bind(source);
            for id in chunk {
                query = query.bind(id);
            }
            existing.extend(query.fetch_all(self.db.pool()).await?);
        }

        let mut seen = HashSet::new();
        Ok(message_ids
            .iter()
            .filter(|id| !existing.contains(*id) && seen.insert(*id))
            .cloned()
            .collect())
    }

    /// Record message IDs with do-nothing-on-conflict semantics. Returns
    /// the number of rows actually inserted (conflicts excluded).
    pub async fn insert_new(
        &self,
        user_id: Uuid,
        source: &str,
        message_ids: &[String],
    ) -> DbResult<u64> {
        let mut conn = self.db.pool().acquire().await?;
        insert_ids(&mut conn, user_id, source, message_ids, now_ts()).await
    }
}

/// Transaction-shareable insert used by both [`DedupStore::insert_new`]
/// and the sync commit in `usage.rs`.
pub(crate) async fn insert_ids(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    source: &str,
    message_ids: &[String],
    synced_at: i64,
) -> DbResult<u64> {
    if message_ids.is_empty() {
        return Ok(0);
    }

    let user = user_id.to_string();
    let mut inserted = 0u64;
    // 5 binds per row.
    for chunk in message_ids.chunks(BIND_CHUNK / 5) {
        let placeholders = vec!["(?, ?, ?, ?, ?)"; chunk.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO synced_message_ids \
             (id, user_id, source, message_id, synced_at) VALUES {placeholders}"
        );
        let mut query = sqlx::query(&sql);
        for id in chunk {
            query = query
                .bind(Uuid::new_v4().to_string())
                .bind(&user)
                .bind(source)
                .bind(id)
                .bind(synced_at);
        }
        inserted += query.execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
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

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn filter_returns_everything_for_a_fresh_user() {
        let (db, user) = db_with_user().await;
        let new = db
            .dedup()
            .filter_new(user, "cursor", &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(new, ids(&["a", "b", "c"]));
    }

    #[tokio::test]
    async fn filter_excludes_recorded_ids() {
        let (db, user) = db_with_user().await;
        let store = db.dedup();
        store.insert_new(user, "cursor", &ids(&["a", "b"])).await.unwrap();

        let new = store
            .filter_new(user, "cursor", &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(new, ids(&["c"]));
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_collapse() {
        let (db, user) = db_with_user().await;
        let new = db
            .dedup()
            .filter_new(user, "cursor", &ids(&["a", "a", "b"]))
            .await
            .unwrap();
        assert_eq!(new, ids(&["a", "b"]));
    }

    #[tokio::test]
    async fn insert_is_idempotent_and_counts_only_fresh_rows() {
        let (db, user) = db_with_user().await;
        let store = db.dedup();
        assert_eq!(
            store.insert_new(user, "cursor", &ids(&["a", "b"])).await.unwrap(),
            2
        );
        assert_eq!(
            store
                .insert_new(user, "cursor", &ids(&["a", "b", "c"]))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn sources_are_independent_namespaces() {
        let (db, user) = db_with_user().await;
        let store = db.dedup();
        store.insert_new(user, "cursor", &ids(&["a"])).await.unwrap();
        let new = store
            .filter_new(user, "claude-code", &ids(&["a"]))
            .await
            .unwrap();
        assert_eq!(new, ids(&["a"]));
    }

    #[tokio::test]
    async fn large_batch_crosses_chunk_boundary() {
        let (db, user) = db_with_user().await;
        let store = db.dedup();
        let batch: Vec<String> = (0..1200).map(|i| format!("msg-{i}")).collect();
        assert_eq!(store.insert_new(user, "cursor", &batch).await.unwrap(), 1200);
        let new = store.filter_new(user, "cursor", &batch).await.unwrap();
        assert!(new.is_empty());
    }
}
