use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use time::OffsetDateTime;

use crate::app::pagination::{Page, PageWindow};
use crate::domain::post::{Post, PostFilter};
use crate::infra::db::Db;

const POST_SELECT: &str = "SELECT p.id, p.text, p.author_id, u.username AS author_username, \
            p.group_id, g.slug AS group_slug, g.title AS group_title, p.image, p.created_at \
     FROM posts p \
     JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id";

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_post(&self, new_post: NewPost) -> Result<Post> {
        let post_id = sqlx::query(
            "INSERT INTO posts (text, author_id, group_id, image, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&new_post.text)
        .bind(new_post.author_id)
        .bind(new_post.group_id)
        .bind(&new_post.image)
        .bind(OffsetDateTime::now_utc())
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        self.get_post(post_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("post {} vanished after insert", post_id))
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?1", POST_SELECT))
            .bind(post_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// Rewrites text and group of a post owned by `author_id`. Returns `None`
    /// when no such post belongs to that author.
    pub async fn update_post(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
        group_id: Option<i64>,
    ) -> Result<Option<Post>> {
        let result = sqlx::query(
            "UPDATE posts SET text = ?3, group_id = ?4 \
             WHERE id = ?1 AND author_id = ?2",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .bind(group_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(post_id).await
    }

    pub async fn count(&self) -> Result<i64> {
        self.count_matching(&PostFilter::default()).await
    }

    pub async fn count_matching(&self, filter: &PostFilter) -> Result<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.author_id",
        );
        push_filter(&mut builder, filter);
        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    pub async fn filter(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY p.id DESC");

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(post_from_row).collect()
    }

    pub async fn list_page(
        &self,
        filter: &PostFilter,
        requested_page: Option<&str>,
        per_page: i64,
    ) -> Result<Page<Post>> {
        let count = self.count_matching(filter).await?;
        let window = PageWindow::resolve(requested_page, count, per_page);

        let mut builder = QueryBuilder::<Sqlite>::new(POST_SELECT);
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY p.id DESC LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        let posts = rows.iter().map(post_from_row).collect::<Result<Vec<_>>>()?;
        Ok(window.into_page(posts))
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(text) = &filter.text {
        builder.push(" AND p.text = ").push_bind(text.clone());
    }
    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ").push_bind(author_id);
    }
    if let Some(group_id) = filter.group_id {
        builder.push(" AND p.group_id = ").push_bind(group_id);
    }
    if let Some(follower_id) = filter.followed_by {
        builder
            .push(" AND p.author_id IN (SELECT author_id FROM follows WHERE user_id = ")
            .push_bind(follower_id)
            .push(")");
    }
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        author_id: row.try_get("author_id")?,
        author_username: row.try_get("author_username")?,
        group_id: row.try_get("group_id")?,
        group_slug: row.try_get("group_slug")?,
        group_title: row.try_get("group_title")?,
        image: row.try_get("image")?,
        image_url: None,
        created_at: row.try_get("created_at")?,
    })
}
