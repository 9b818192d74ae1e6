// crates/db/src/users.rs
//! User rows. Profile CRUD lives elsewhere; this store covers what the
//! core pipeline needs: identity lookups for joins and auth, registration
//! for bootstrap, soft delete. Every read filters `deleted_at IS NULL`
//! explicitly in its SQL; there is no hidden filter layer.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::{is_unique_violation, now_ts, Database, DbError, DbResult};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub image: Option<String>,
    pub is_public: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for UserRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: parse_uuid(row.try_get("id")?)?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            image: row.try_get("image")?,
            is_public: row.try_get::<i64, _>("is_public")? != 0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

pub(crate) fn parse_uuid(text: String) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(&text).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[derive(Debug, Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new user. Fails with `Conflict` when the email or username
    /// is taken, `Validation` when the username is malformed.
    pub async fn create(&self, new_user: &NewUser) -> DbResult<UserRow> {
        validate_username(&new_user.username)?;

        let id = Uuid::new_v4();
        let now = now_ts();
        let result = sqlx::query(
            r#"INSERT INTO users (id, email, username, display_name, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.display_name)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(DbError::Conflict(format!(
                    "user with email '{}' or username '{}' already exists",
                    new_user.email, new_user.username
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::Validation("user vanished after insert".into()))
    }

    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE username = ? AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }

    /// Soft delete: set `deleted_at`, excluding the row from all reads.
    /// Returns false when the user does not exist or is already deleted.
    pub async fn soft_delete(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(now_ts())
        .bind(now_ts())
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn validate_username(username: &str) -> DbResult<()> {
    let len_ok = (USERNAME_MIN..=USERNAME_MAX).contains(&username.len());
    let chars_ok = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !len_ok || !chars_ok || username.is_empty() {
        return Err(DbError::Validation(format!(
            "username must be {USERNAME_MIN}-{USERNAME_MAX} characters of [A-Za-z0-9_]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(n: u32) -> NewUser {
        NewUser {
            email: format!("dev{n}@example.com"),
            username: format!("dev_{n}"),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let db = Database::new_in_memory().await.unwrap();
        let created = db.users().create(&user(1)).await.unwrap();
        let fetched = db.users().get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "dev_1");
        assert!(fetched.is_public);
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let db = Database::new_in_memory().await.unwrap();
        db.users().create(&user(1)).await.unwrap();
        let mut dup = user(2);
        dup.username = "dev_1".into();
        assert!(matches!(
            db.users().create(&dup).await,
            Err(DbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn malformed_username_rejected() {
        let db = Database::new_in_memory().await.unwrap();
        for bad in ["ab", "has space", "way-too-dashy", &"x".repeat(31)] {
            let mut nu = user(9);
            nu.username = bad.to_string();
            assert!(matches!(
                db.users().create(&nu).await,
                Err(DbError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn soft_deleted_user_is_invisible() {
        let db = Database::new_in_memory().await.unwrap();
        let created = db.users().create(&user(1)).await.unwrap();
        assert!(db.users().soft_delete(created.id).await.unwrap());
        assert!(db.users().get_by_id(created.id).await.unwrap().is_none());
        assert!(!db.users().soft_delete(created.id).await.unwrap());
    }
}
