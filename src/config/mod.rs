use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub session_key: [u8; 32],
    pub session_ttl_hours: u64,
    pub storage: StorageConfig,
    pub upload_max_bytes: usize,
    pub posts_per_page: i64,
}

#[derive(Clone, Debug)]
pub enum StorageConfig {
    Local {
        media_root: PathBuf,
    },
    S3 {
        endpoint: String,
        public_endpoint: Option<String>,
        region: String,
        bucket: String,
    },
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let posts_per_page: i64 = env_or_parse("POSTS_PER_PAGE", "10")?;
        if posts_per_page < 1 {
            return Err(anyhow!("invalid POSTS_PER_PAGE: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            database_url: env_or("DATABASE_URL", "sqlite://yatube.sqlite3"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "5")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            session_key: env_key_32("SESSION_KEY")?,
            session_ttl_hours: env_or_parse("SESSION_TTL_HOURS", "336")?,
            storage: storage_from_env()?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "5242880")?,
            posts_per_page,
        })
    }
}

fn storage_from_env() -> Result<StorageConfig> {
    match env_or("STORAGE_BACKEND", "local").as_str() {
        "local" => Ok(StorageConfig::Local {
            media_root: PathBuf::from(env_or("MEDIA_ROOT", "media")),
        }),
        "s3" => Ok(StorageConfig::S3 {
            endpoint: env_or_err("S3_ENDPOINT")?,
            public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
            region: env_or("S3_REGION", "fr-par"),
            bucket: env_or_err("S3_BUCKET")?,
        }),
        other => Err(anyhow!("unknown STORAGE_BACKEND: {}", other)),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(&value).map_err(|err| anyhow!("invalid {}: {}", key, err))
}

pub fn decode_key_32(value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD.decode(value.as_bytes())?;
    if decoded.len() != 32 {
        return Err(anyhow!("expected 32 bytes, got {}", decoded.len()));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
