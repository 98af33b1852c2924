use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use time::OffsetDateTime;

use crate::domain::comment::{Comment, CommentFilter};
use crate::infra::db::Db;

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.username AS author_username, \
            c.text, c.created_at \
     FROM comments c \
     JOIN users u ON u.id = c.author_id";

#[derive(Clone)]
pub struct CommentService {
    db: Db,
}

impl CommentService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_comment(&self, post_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        let comment_id = sqlx::query(
            "INSERT INTO comments (post_id, author_id, text, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .bind(OffsetDateTime::now_utc())
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        let row = sqlx::query(&format!("{} WHERE c.id = ?1", COMMENT_SELECT))
            .bind(comment_id)
            .fetch_one(self.db.pool())
            .await?;

        comment_from_row(&row)
    }

    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub async fn filter(&self, filter: &CommentFilter) -> Result<Vec<Comment>> {
        let mut builder = QueryBuilder::<Sqlite>::new(COMMENT_SELECT);
        builder.push(" WHERE 1 = 1");
        if let Some(text) = &filter.text {
            builder.push(" AND c.text = ").push_bind(text.clone());
        }
        if let Some(author_id) = filter.author_id {
            builder.push(" AND c.author_id = ").push_bind(author_id);
        }
        if let Some(post_id) = filter.post_id {
            builder.push(" AND c.post_id = ").push_bind(post_id);
        }
        builder.push(" ORDER BY c.id ASC");

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(comment_from_row).collect()
    }

    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.filter(&CommentFilter {
            post_id: Some(post_id),
            ..CommentFilter::default()
        })
        .await
    }
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        author_id: row.try_get("author_id")?,
        author_username: row.try_get("author_username")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
    })
}
