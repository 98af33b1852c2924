use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::domain::user::{AuthorSummary, User};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct UserService {
    db: Db,
}

impl UserService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, username, email, created_at FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row =
            sqlx::query("SELECT id, username, email, created_at FROM users WHERE username = ?1")
                .bind(username)
                .fetch_optional(self.db.pool())
                .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn author_summary(&self, user_id: i64) -> Result<Option<AuthorSummary>> {
        let row = sqlx::query(
            "SELECT u.id, u.username, \
                    (SELECT COUNT(*) FROM posts p WHERE p.author_id = u.id) AS posts_count \
             FROM users u WHERE u.id = ?1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        let summary = match row {
            Some(row) => Some(AuthorSummary {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                posts_count: row.try_get("posts_count")?,
            }),
            None => None,
        };

        Ok(summary)
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}
