use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::services::ServeDir;

use crate::AppState;

mod auth;
mod error;
mod forms;
mod handlers;
mod routes;

pub use auth::{login_url, AuthUser, LoginRequired, SESSION_COOKIE};
pub use error::AppError;
pub use forms::FormErrors;

/// Multipart framing and the text fields ride on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(routes::health())
        .merge(routes::pages())
        .merge(routes::posts())
        .merge(routes::follows())
        .merge(routes::accounts());

    if let Some(media_root) = state.storage.local_root() {
        router = router.nest_service("/media", ServeDir::new(media_root));
    }

    router
        .layer(DefaultBodyLimit::max(
            state.upload_max_bytes + FORM_OVERHEAD_BYTES,
        ))
        .with_state(state)
}
