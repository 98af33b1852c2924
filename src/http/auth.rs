use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::app::auth::IssuedSession;
use crate::AppState;

pub const SESSION_COOKIE: &str = "sessionid";
pub const LOGIN_PATH: &str = "/auth/login/";

/// The acting identity of a request. Handlers that take `AuthUser` are
/// login-only; `Option<AuthUser>` admits anonymous visitors.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
}

/// Rejection for anonymous requests to login-only handlers: a redirect to
/// the login page that remembers where the visitor was going.
#[derive(Debug)]
pub struct LoginRequired {
    next: String,
}

impl IntoResponse for LoginRequired {
    fn into_response(self) -> Response {
        Redirect::to(&login_url(&self.next)).into_response()
    }
}

pub fn login_url(next: &str) -> String {
    format!("{}?next={}", LOGIN_PATH, encode_component(next).replace("%2F", "/"))
}

/// Percent-encodes a path segment or query value for a `Location` header.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Only same-site absolute paths are followed after login. Control
/// characters never reach a `Location` header.
pub fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|next| {
        next.starts_with('/')
            && !next.starts_with("//")
            && !next.contains('\\')
            && !next.chars().any(char::is_control)
    })
}

pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(session: IssuedSession) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .expires(session.expires_at)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = LoginRequired;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let login_required = || LoginRequired { next: next.clone() };

        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar)
            .or_else(|| bearer_token(parts))
            .ok_or_else(login_required)?;

        let session = state
            .auth_service()
            .authenticate(&token)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to authenticate session");
                login_required()
            })?
            .ok_or_else(login_required)?;

        Ok(AuthUser {
            user_id: session.user_id,
            username: session.username,
        })
    }
}
