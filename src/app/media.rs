use anyhow::Result;
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;
use uuid::Uuid;

use crate::infra::storage::ObjectStorage;

const POST_IMAGE_PREFIX: &str = "posts";
const MAX_FILE_NAME_LEN: usize = 100;

/// An uploaded file as received from a form.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
    /// Set when the file outgrew the upload limit while being read; `data`
    /// is then empty.
    pub truncated: bool,
}

/// An upload that decoded as a supported image.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub file_name: String,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRejection {
    TooLarge { max_bytes: usize },
    NotAnImage,
}

impl ImageRejection {
    pub fn message(&self) -> String {
        match self {
            Self::TooLarge { max_bytes } => {
                format!("Ensure the uploaded file is at most {} bytes.", max_bytes)
            }
            Self::NotAnImage => "Upload a valid image. The file you uploaded was either not an \
                                 image or a corrupted image."
                .to_string(),
        }
    }
}

#[derive(Clone)]
pub struct MediaService {
    storage: ObjectStorage,
    max_bytes: usize,
}

impl MediaService {
    pub fn new(storage: ObjectStorage, max_bytes: usize) -> Self {
        Self { storage, max_bytes }
    }

    /// Sniffs the format from the bytes themselves; the declared content type
    /// is not trusted.
    pub fn validate_image(&self, upload: Upload) -> Result<ValidImage, ImageRejection> {
        if upload.truncated || upload.data.len() > self.max_bytes {
            return Err(ImageRejection::TooLarge {
                max_bytes: self.max_bytes,
            });
        }

        let format = image::guess_format(&upload.data).map_err(|_| ImageRejection::NotAnImage)?;
        let content_type = match format {
            ImageFormat::Gif => "image/gif",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            _ => return Err(ImageRejection::NotAnImage),
        };

        let (width, height) = ImageReader::with_format(Cursor::new(&upload.data[..]), format)
            .into_dimensions()
            .map_err(|_| ImageRejection::NotAnImage)?;
        if width == 0 || height == 0 {
            return Err(ImageRejection::NotAnImage);
        }

        if let Some(declared) = upload.content_type.as_deref() {
            if declared != content_type {
                tracing::debug!(declared, detected = content_type, "upload content type mismatch");
            }
        }

        Ok(ValidImage {
            file_name: upload.file_name,
            content_type,
            width,
            height,
            data: upload.data,
        })
    }

    pub async fn store_post_image(&self, image: ValidImage) -> Result<String> {
        let key = format!(
            "{}/{}_{}",
            POST_IMAGE_PREFIX,
            Uuid::new_v4().simple(),
            sanitize_file_name(&image.file_name)
        );
        let key = self.storage.put(&key, image.data, image.content_type).await?;
        tracing::info!(key = %key, width = image.width, height = image.height, "stored post image");
        Ok(key)
    }

    pub async fn discard(&self, key: &str) {
        if let Err(err) = self.storage.delete(key).await {
            tracing::warn!(error = ?err, key, "failed to remove orphaned image");
        }
    }

    pub fn url(&self, key: &str) -> String {
        self.storage.url(key)
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "upload".to_string();
    }
    let start = cleaned.len().saturating_sub(MAX_FILE_NAME_LEN);
    cleaned[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::LocalStorage;

    const SMALL_GIF: &[u8] = b"\x47\x49\x46\x38\x39\x61\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\
\xFF\xFF\xFF\x21\xF9\x04\x00\x00\x00\x00\x00\x2C\x00\x00\x00\x00\
\x02\x00\x01\x00\x00\x02\x02\x0C\x0A\x00\x3B";

    fn service(max_bytes: usize) -> MediaService {
        MediaService::new(ObjectStorage::Local(LocalStorage::new("unused")), max_bytes)
    }

    fn upload(data: &'static [u8]) -> Upload {
        Upload {
            file_name: "small.gif".to_string(),
            content_type: Some("image/gif".to_string()),
            data: Bytes::from_static(data),
            truncated: false,
        }
    }

    #[test]
    fn accepts_small_gif() {
        let image = service(1024).validate_image(upload(SMALL_GIF)).unwrap();
        assert_eq!(image.content_type, "image/gif");
        assert_eq!((image.width, image.height), (2, 1));
    }

    #[test]
    fn rejects_text_disguised_as_gif() {
        let err = service(1024)
            .validate_image(upload(b"definitely not an image"))
            .unwrap_err();
        assert_eq!(err, ImageRejection::NotAnImage);
    }

    #[test]
    fn rejects_oversized_upload() {
        let err = service(8).validate_image(upload(SMALL_GIF)).unwrap_err();
        assert_eq!(err, ImageRejection::TooLarge { max_bytes: 8 });

        let cut_off = Upload {
            truncated: true,
            ..Upload::default()
        };
        let err = service(1024).validate_image(cut_off).unwrap_err();
        assert_eq!(err, ImageRejection::TooLarge { max_bytes: 1024 });
    }

    #[test]
    fn file_names_are_flattened() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).gif"), "my_photo__1_.gif");
        assert_eq!(sanitize_file_name("котик.png"), "_____.png");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
    }
}
