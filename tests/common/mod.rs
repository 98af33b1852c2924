#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

use yatube::app::comments::CommentService;
use yatube::app::groups::GroupService;
use yatube::app::posts::{NewPost, PostService};
use yatube::app::social::SocialService;
use yatube::config::{decode_key_32, AppConfig, StorageConfig};
use yatube::domain::group::Group;
use yatube::domain::post::Post;
use yatube::http::SESSION_COOKIE;
use yatube::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (32 bytes), test-only
const TEST_SESSION_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
const MULTIPART_BOUNDARY: &str = "----yatube-test-boundary";
pub const TEST_UPLOAD_MAX_BYTES: usize = 64 * 1024;

/// 2x1 GIF.
pub const SMALL_GIF: &[u8] = b"\x47\x49\x46\x38\x39\x61\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\
\xFF\xFF\xFF\x21\xF9\x04\x00\x00\x00\x00\x00\x2C\x00\x00\x00\x00\
\x02\x00\x01\x00\x00\x02\x02\x0C\x0A\x00\x3B";

// ---------------------------------------------------------------------------
// TestApp: a fresh database and media root per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub media_root: PathBuf,
    // dropped last; removes the database file and every stored upload
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn assert_redirect(&self, target: &str) {
        assert_eq!(self.status, StatusCode::SEE_OTHER, "body: {}", self.json());
        assert_eq!(self.location.as_deref(), Some(target));
    }

    /// Value of the session cookie set by this response, if any.
    pub fn session_cookie(&self) -> Option<String> {
        self.set_cookies.iter().find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
    }
}

pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub cookie: String,
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub async fn app() -> TestApp {
    TestApp::setup().await
}

impl TestApp {
    async fn setup() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let media_root = dir.path().join("media");
        let database_path = dir.path().join("yatube.sqlite3");

        let config = AppConfig {
            http_addr: "127.0.0.1:0".to_string(),
            database_url: format!("sqlite://{}", database_path.display()),
            db_max_connections: 5,
            db_connect_timeout_seconds: 5,
            session_key: decode_key_32(TEST_SESSION_KEY).expect("bad test key"),
            session_ttl_hours: 1,
            storage: StorageConfig::Local {
                media_root: media_root.clone(),
            },
            upload_max_bytes: TEST_UPLOAD_MAX_BYTES,
            posts_per_page: 10,
        };

        let state = AppState::from_config(&config)
            .await
            .expect("AppState::from_config failed");
        let router = yatube::http::router(state.clone());

        TestApp {
            router,
            state,
            media_root,
            _dir: dir,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
        user: Option<&TestUser>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(user) = user {
            builder = builder.header(header::COOKIE, user.cookie.as_str());
        }

        let request = builder.body(Body::from(body)).unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|value| value.to_str().unwrap().to_string());
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap().to_string())
            .collect();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            location,
            set_cookies,
            body_bytes,
        }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, user: Option<&TestUser>) -> TestResponse {
        self.request(Method::GET, path, None, Vec::new(), user).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        user: Option<&TestUser>,
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.request(
            Method::POST,
            path,
            Some("application/x-www-form-urlencoded"),
            body.into_bytes(),
            user,
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[Part<'_>],
        user: Option<&TestUser>,
    ) -> TestResponse {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: {}\r\n\r\n",
                            name, file_name, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

        let content_type = format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY);
        self.request(Method::POST, path, Some(&content_type), body, user)
            .await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Create a user without a password and open a session for it directly.
    pub async fn create_user(&self, username: &str) -> TestUser {
        let auth = self.state.auth_service();
        let user = auth
            .create_user(username, None, None)
            .await
            .expect("insert test user failed");
        let session = auth
            .start_session(user.id)
            .await
            .expect("start_session failed");

        TestUser {
            id: user.id,
            username: user.username,
            cookie: format!("{}={}", SESSION_COOKIE, session.token),
        }
    }

    pub async fn create_group(&self, slug: &str) -> Group {
        GroupService::new(self.state.db.clone())
            .create_group("Тестовая группа", slug, "Тестовое описание")
            .await
            .expect("insert test group failed")
    }

    pub async fn create_post(&self, author: &TestUser, text: &str, group_id: Option<i64>) -> Post {
        PostService::new(self.state.db.clone())
            .create_post(NewPost {
                author_id: author.id,
                text: text.to_string(),
                group_id,
                image: None,
            })
            .await
            .expect("insert test post failed")
    }

    pub fn posts(&self) -> PostService {
        PostService::new(self.state.db.clone())
    }

    pub fn comments(&self) -> CommentService {
        CommentService::new(self.state.db.clone())
    }

    pub fn social(&self) -> SocialService {
        SocialService::new(self.state.db.clone())
    }

    /// Relative paths of every file under the media root.
    pub fn stored_media(&self) -> Vec<String> {
        let mut files = Vec::new();
        let mut pending = vec![self.media_root.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    let relative = path.strip_prefix(&self.media_root).unwrap();
                    files.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        files.sort();
        files
    }
}
