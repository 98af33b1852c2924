use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

use crate::config::StorageConfig;

/// File storage for uploaded media, addressed by relative object keys such
/// as `posts/<uuid>_photo.gif`.
#[derive(Clone)]
pub enum ObjectStorage {
    Local(LocalStorage),
    S3(S3Storage),
}

#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_endpoint: String,
}

impl ObjectStorage {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Local { media_root } => Ok(Self::Local(LocalStorage::new(media_root))),
            StorageConfig::S3 {
                endpoint,
                public_endpoint,
                region,
                bucket,
            } => {
                let storage =
                    S3Storage::new(endpoint, public_endpoint.as_deref(), region, bucket).await?;
                Ok(Self::S3(storage))
            }
        }
    }

    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        match self {
            Self::Local(local) => local.put(key, data).await?,
            Self::S3(s3) => s3.put(key, data, content_type).await?,
        }
        Ok(key.to_string())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Self::Local(local) => local.delete(key).await,
            Self::S3(s3) => s3.delete(key).await,
        }
    }

    pub fn url(&self, key: &str) -> String {
        match self {
            Self::Local(_) => format!("/media/{}", key),
            Self::S3(s3) => format!(
                "{}/{}/{}",
                s3.public_endpoint.trim_end_matches('/'),
                s3.bucket,
                key
            ),
        }
    }

    /// Root directory served under `/media` when files live on local disk.
    pub fn local_root(&self) -> Option<&Path> {
        match self {
            Self::Local(local) => Some(&local.root),
            Self::S3(_) => None,
        }
    }
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(anyhow!("invalid object key: {}", key));
        }
        Ok(self.root.join(relative))
    }
}

impl S3Storage {
    async fn new(
        endpoint: &str,
        public_endpoint: Option<&str>,
        region: &str,
        bucket: &str,
    ) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(region.to_string()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(endpoint.to_string())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(s3_builder.build());

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            public_endpoint: public_endpoint.unwrap_or(endpoint).to_string(),
        })
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_round_trips_and_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ObjectStorage::Local(LocalStorage::new(dir.path()));

        let key = storage
            .put("posts/a.gif", Bytes::from_static(b"GIF89a"), "image/gif")
            .await
            .unwrap();
        assert_eq!(key, "posts/a.gif");
        assert_eq!(
            std::fs::read(dir.path().join("posts/a.gif")).unwrap(),
            b"GIF89a"
        );
        assert_eq!(storage.url(&key), "/media/posts/a.gif");

        storage.delete(&key).await.unwrap();
        assert!(!dir.path().join("posts/a.gif").exists());
        storage.delete(&key).await.unwrap();

        assert!(storage
            .put("../outside.gif", Bytes::from_static(b"x"), "image/gif")
            .await
            .is_err());
        assert!(storage
            .put("/abs.gif", Bytes::from_static(b"x"), "image/gif")
            .await
            .is_err());
    }
}
