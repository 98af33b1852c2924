use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::domain::group::Group;
use crate::infra::db::Db;

#[derive(Clone)]
pub struct GroupService {
    db: Db,
}

impl GroupService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Groups are managed out-of-band; this is the fixture/admin entry point.
    pub async fn create_group(&self, title: &str, slug: &str, description: &str) -> Result<Group> {
        let group_id = sqlx::query(
            "INSERT INTO groups (title, slug, description) VALUES (?1, ?2, ?3)",
        )
        .bind(title)
        .bind(slug)
        .bind(description)
        .execute(self.db.pool())
        .await?
        .last_insert_rowid();

        self.get_group(group_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("group {} vanished after insert", group_id))
    }

    pub async fn get_group(&self, group_id: i64) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, title, slug, description FROM groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, title, slug, description FROM groups WHERE slug = ?1")
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT id, title, slug, description FROM groups ORDER BY title, id")
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(group_from_row).collect()
    }
}

fn group_from_row(row: &SqliteRow) -> Result<Group> {
    Ok(Group {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
    })
}
