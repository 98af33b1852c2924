pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use anyhow::Result;

use crate::app::auth::AuthService;
use crate::app::media::MediaService;
use crate::config::AppConfig;
use crate::infra::{db::Db, storage::ObjectStorage};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub storage: ObjectStorage,
    pub session_key: [u8; 32],
    pub session_ttl_hours: u64,
    pub upload_max_bytes: usize,
    pub posts_per_page: i64,
}

impl AppState {
    /// Connects the store and storage backend and applies pending migrations.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db = Db::connect(config).await?;
        db.migrate().await?;
        let storage = ObjectStorage::new(&config.storage).await?;

        Ok(Self {
            db,
            storage,
            session_key: config.session_key,
            session_ttl_hours: config.session_ttl_hours,
            upload_max_bytes: config.upload_max_bytes,
            posts_per_page: config.posts_per_page,
        })
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.db.clone(), self.session_key, self.session_ttl_hours)
    }

    pub fn media_service(&self) -> MediaService {
        MediaService::new(self.storage.clone(), self.upload_max_bytes)
    }
}
