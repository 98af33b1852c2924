use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Author card shown on profile and post detail pages.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub posts_count: i64,
}
