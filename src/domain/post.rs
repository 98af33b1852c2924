use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub author_id: i64,
    pub author_username: String,
    pub group_id: Option<i64>,
    pub group_slug: Option<String>,
    pub group_title: Option<String>,
    /// Storage key of the attached image.
    #[serde(skip_serializing)]
    pub image: Option<String>,
    /// Public URL for the image (populated at response time)
    #[serde(skip_deserializing)]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Predicate over posts. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub text: Option<String>,
    pub author_id: Option<i64>,
    pub group_id: Option<i64>,
    /// Only posts whose author is followed by this user.
    pub followed_by: Option<i64>,
}
