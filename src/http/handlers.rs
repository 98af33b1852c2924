use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::app::comments::CommentService;
use crate::app::groups::GroupService;
use crate::app::media::MediaService;
use crate::app::pagination::Page;
use crate::app::posts::{NewPost, PostService};
use crate::app::social::SocialService;
use crate::app::users::UserService;
use crate::domain::comment::Comment;
use crate::domain::group::Group;
use crate::domain::post::{Post, PostFilter};
use crate::domain::user::AuthorSummary;
use crate::http::auth::{
    encode_component, expired_session_cookie, safe_next, session_cookie, session_token,
};
use crate::http::forms::{
    CommentForm, FormErrors, LoginForm, PostFields, PostSubmission, SignupForm, INVALID_CHOICE,
    NON_FIELD_ERRORS,
};
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Serialize)]
pub struct IndexPage {
    pub page: Page<Post>,
}

#[derive(Serialize)]
pub struct GroupPage {
    pub group: Group,
    pub page: Page<Post>,
}

#[derive(Serialize)]
pub struct ProfilePage {
    pub author: AuthorSummary,
    pub following: bool,
    pub page: Page<Post>,
}

#[derive(Serialize)]
pub struct PostDetailPage {
    pub post: Post,
    pub author: AuthorSummary,
    pub comments: Vec<Comment>,
    pub form: CommentForm,
}

#[derive(Serialize)]
pub struct PostFormPage {
    pub is_edit: bool,
    pub post_id: Option<i64>,
    pub form: PostFields,
    pub errors: FormErrors,
    pub groups: Vec<Group>,
}

#[derive(Serialize)]
pub struct CommentFormPage {
    pub post_id: i64,
    pub form: CommentForm,
    pub errors: FormErrors,
}

#[derive(Serialize)]
pub struct SignupPage {
    pub form: SignupForm,
    pub errors: FormErrors,
}

#[derive(Serialize)]
pub struct LoginPage {
    pub form: LoginForm,
    pub errors: FormErrors,
}

#[derive(Serialize)]
pub struct LoggedOutPage {
    pub logged_out: bool,
}

fn profile_url(username: &str) -> String {
    format!("/profile/{}/", encode_component(username))
}

fn post_detail_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

fn with_image_url(mut post: Post, media: &MediaService) -> Post {
    post.image_url = post.image.as_deref().map(|key| media.url(key));
    post
}

fn with_image_urls(page: Page<Post>, media: &MediaService) -> Page<Post> {
    page.map(|post| with_image_url(post, media))
}

async fn load_post(state: &AppState, post_id: i64) -> Result<Post, AppError> {
    let service = PostService::new(state.db.clone());
    let post = service.get_post(post_id).await.map_err(|err| {
        tracing::error!(error = ?err, post_id, "failed to fetch post");
        AppError::internal("failed to fetch post")
    })?;

    post.ok_or_else(|| AppError::not_found("post not found"))
}

async fn load_author(state: &AppState, username: &str) -> Result<AuthorSummary, AppError> {
    let users = UserService::new(state.db.clone());
    let user = users
        .get_by_username(username)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, username, "failed to fetch user");
            AppError::internal("failed to fetch user")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    users
        .author_summary(user.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = user.id, "failed to summarize author");
            AppError::internal("failed to fetch user")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))
}

async fn list_posts(
    state: &AppState,
    filter: &PostFilter,
    requested_page: Option<&str>,
) -> Result<Page<Post>, AppError> {
    let service = PostService::new(state.db.clone());
    let page = service
        .list_page(filter, requested_page, state.posts_per_page)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list posts");
            AppError::internal("failed to list posts")
        })?;

    Ok(with_image_urls(page, &state.media_service()))
}

/// Maps the raw `group` choice to an existing group id, recording a field
/// error when the choice is not a known group.
async fn resolve_group(
    state: &AppState,
    raw: Option<&str>,
    errors: &mut FormErrors,
) -> Result<Option<i64>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let Ok(group_id) = raw.parse::<i64>() else {
        errors.add("group", INVALID_CHOICE);
        return Ok(None);
    };

    let group = GroupService::new(state.db.clone())
        .get_group(group_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, group_id, "failed to fetch group");
            AppError::internal("failed to fetch group")
        })?;

    match group {
        Some(group) => Ok(Some(group.id)),
        None => {
            errors.add("group", INVALID_CHOICE);
            Ok(None)
        }
    }
}

async fn render_post_form(
    state: &AppState,
    post_id: Option<i64>,
    form: PostFields,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let groups = GroupService::new(state.db.clone())
        .list_groups()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list groups");
            AppError::internal("failed to list groups")
        })?;

    Ok(Json(PostFormPage {
        is_edit: post_id.is_some(),
        post_id,
        form,
        errors,
        groups,
    })
    .into_response())
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.db.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<IndexPage>, AppError> {
    let page = list_posts(&state, &PostFilter::default(), query.page.as_deref()).await?;
    Ok(Json(IndexPage { page }))
}

pub async fn group_posts(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GroupPage>, AppError> {
    let group = GroupService::new(state.db.clone())
        .get_by_slug(&slug)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, slug = %slug, "failed to fetch group");
            AppError::internal("failed to fetch group")
        })?
        .ok_or_else(|| AppError::not_found("group not found"))?;

    let filter = PostFilter {
        group_id: Some(group.id),
        ..PostFilter::default()
    };
    let page = list_posts(&state, &filter, query.page.as_deref()).await?;

    Ok(Json(GroupPage { group, page }))
}

pub async fn profile(
    Path(username): Path<String>,
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProfilePage>, AppError> {
    let author = load_author(&state, &username).await?;

    let following = match viewer {
        Some(viewer) if viewer.user_id != author.id => SocialService::new(state.db.clone())
            .is_following(viewer.user_id, author.id)
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, author_id = author.id, "failed to check follow");
                AppError::internal("failed to fetch profile")
            })?,
        _ => false,
    };

    let filter = PostFilter {
        author_id: Some(author.id),
        ..PostFilter::default()
    };
    let page = list_posts(&state, &filter, query.page.as_deref()).await?;

    Ok(Json(ProfilePage {
        author,
        following,
        page,
    }))
}

pub async fn post_detail(
    Path(post_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<PostDetailPage>, AppError> {
    let post = load_post(&state, post_id).await?;
    let post = with_image_url(post, &state.media_service());

    let author = load_author(&state, &post.author_username).await?;
    let comments = CommentService::new(state.db.clone())
        .list_for_post(post_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?;

    Ok(Json(PostDetailPage {
        post,
        author,
        comments,
        form: CommentForm::default(),
    }))
}

pub async fn post_create_form(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    render_post_form(&state, None, PostFields::default(), FormErrors::default()).await
}

pub async fn post_create(
    auth: AuthUser,
    State(state): State<AppState>,
    submission: PostSubmission,
) -> Result<Response, AppError> {
    let PostSubmission { mut fields, image } = submission;
    fields.normalize();

    let mut errors = FormErrors::from_validation(fields.validate());
    let group_id = resolve_group(&state, fields.group.as_deref(), &mut errors).await?;

    let media = state.media_service();
    let image = match image.map(|upload| media.validate_image(upload)) {
        Some(Ok(image)) => Some(image),
        Some(Err(rejection)) => {
            errors.add("image", rejection.message());
            None
        }
        None => None,
    };

    if !errors.is_empty() {
        return render_post_form(&state, None, fields, errors).await;
    }

    let image_key = match image {
        Some(image) => Some(media.store_post_image(image).await.map_err(|err| {
            tracing::error!(error = ?err, author_id = auth.user_id, "failed to store image");
            AppError::internal("failed to store image")
        })?),
        None => None,
    };

    let service = PostService::new(state.db.clone());
    let created = service
        .create_post(NewPost {
            author_id: auth.user_id,
            text: fields.text,
            group_id,
            image: image_key.clone(),
        })
        .await;

    let post = match created {
        Ok(post) => post,
        Err(err) => {
            tracing::error!(error = ?err, author_id = auth.user_id, "failed to create post");
            if let Some(key) = image_key {
                media.discard(&key).await;
            }
            return Err(AppError::internal("failed to create post"));
        }
    };

    tracing::info!(post_id = post.id, author_id = auth.user_id, "post created");
    Ok(Redirect::to(&profile_url(&auth.username)).into_response())
}

pub async fn post_edit_form(
    Path(post_id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;
    if post.author_id != auth.user_id {
        return Ok(Redirect::to(&post_detail_url(post_id)).into_response());
    }

    let form = PostFields {
        text: post.text,
        group: post.group_id.map(|group_id| group_id.to_string()),
    };
    render_post_form(&state, Some(post_id), form, FormErrors::default()).await
}

pub async fn post_edit(
    Path(post_id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
    submission: PostSubmission,
) -> Result<Response, AppError> {
    let post = load_post(&state, post_id).await?;
    if post.author_id != auth.user_id {
        tracing::warn!(post_id, user_id = auth.user_id, "edit attempt by non-author");
        return Ok(Redirect::to(&post_detail_url(post_id)).into_response());
    }

    let mut fields = submission.fields;
    fields.normalize();

    let mut errors = FormErrors::from_validation(fields.validate());
    let group_id = resolve_group(&state, fields.group.as_deref(), &mut errors).await?;
    if !errors.is_empty() {
        return render_post_form(&state, Some(post_id), fields, errors).await;
    }

    let service = PostService::new(state.db.clone());
    let updated = service
        .update_post(post_id, auth.user_id, &fields.text, group_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id, "failed to update post");
            AppError::internal("failed to update post")
        })?;

    match updated {
        Some(_) => {
            tracing::info!(post_id, author_id = auth.user_id, "post updated");
            Ok(Redirect::to(&post_detail_url(post_id)).into_response())
        }
        None => Err(AppError::not_found("post not found")),
    }
}

pub async fn add_comment(
    Path(post_id): Path<i64>,
    auth: AuthUser,
    State(state): State<AppState>,
    Form(mut form): Form<CommentForm>,
) -> Result<Response, AppError> {
    load_post(&state, post_id).await?;

    form.normalize();
    let errors = FormErrors::from_validation(form.validate());
    if !errors.is_empty() {
        return Ok(Json(CommentFormPage {
            post_id,
            form,
            errors,
        })
        .into_response());
    }

    let comment = CommentService::new(state.db.clone())
        .create_comment(post_id, auth.user_id, &form.text)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, post_id, author_id = auth.user_id, "failed to create comment");
            AppError::internal("failed to create comment")
        })?;

    tracing::info!(comment_id = comment.id, post_id, author_id = auth.user_id, "comment created");
    Ok(Redirect::to(&post_detail_url(post_id)).into_response())
}

pub async fn follow_index(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<IndexPage>, AppError> {
    let filter = PostFilter {
        followed_by: Some(auth.user_id),
        ..PostFilter::default()
    };
    let page = list_posts(&state, &filter, query.page.as_deref()).await?;
    Ok(Json(IndexPage { page }))
}

pub async fn profile_follow(
    Path(username): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let author = load_author(&state, &username).await?;
    let followed = SocialService::new(state.db.clone())
        .follow(auth.user_id, author.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = auth.user_id, author_id = author.id, "failed to follow");
            AppError::internal("failed to follow")
        })?;

    if followed {
        tracing::info!(user_id = auth.user_id, author_id = author.id, "followed author");
    }
    Ok(Redirect::to(&profile_url(&author.username)))
}

pub async fn profile_unfollow(
    Path(username): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Redirect, AppError> {
    let author = load_author(&state, &username).await?;
    SocialService::new(state.db.clone())
        .unfollow(auth.user_id, author.id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = auth.user_id, author_id = author.id, "failed to unfollow");
            AppError::internal("failed to unfollow")
        })?;

    Ok(Redirect::to(&profile_url(&author.username)))
}

pub async fn signup_form() -> Json<SignupPage> {
    Json(SignupPage {
        form: SignupForm::default(),
        errors: FormErrors::default(),
    })
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(mut form): Form<SignupForm>,
) -> Result<Response, AppError> {
    form.normalize();
    let mut errors = FormErrors::from_validation(form.validate());

    if !errors.is_empty() {
        return Ok(Json(SignupPage { form, errors }).into_response());
    }

    let taken = UserService::new(state.db.clone())
        .get_by_username(&form.username)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check username");
            AppError::internal("failed to sign up")
        })?
        .is_some();
    if taken {
        errors.add("username", "A user with that username already exists.");
        return Ok(Json(SignupPage { form, errors }).into_response());
    }

    let auth = state.auth_service();
    let user = auth
        .create_user(&form.username, form.email.as_deref(), Some(&form.password))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create user");
            AppError::internal("failed to sign up")
        })?;
    let session = auth.start_session(user.id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = user.id, "failed to start session");
        AppError::internal("failed to sign up")
    })?;

    tracing::info!(user_id = user.id, username = %user.username, "user signed up");
    let jar = jar.add(session_cookie(session));
    Ok((jar, Redirect::to("/")).into_response())
}

#[derive(Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

pub async fn login_form(Query(query): Query<NextQuery>) -> Json<LoginPage> {
    Json(LoginPage {
        form: LoginForm {
            next: query.next,
            ..LoginForm::default()
        },
        errors: FormErrors::default(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, AppError> {
    form.username = form.username.trim().to_string();

    let session = state
        .auth_service()
        .login(&form.username, &form.password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?;

    let Some(session) = session else {
        let mut errors = FormErrors::default();
        errors.add(
            NON_FIELD_ERRORS,
            "Please enter a correct username and password. Note that both fields may be \
             case-sensitive.",
        );
        return Ok(Json(LoginPage { form, errors }).into_response());
    };

    let target = safe_next(form.next.as_deref()).unwrap_or("/").to_string();
    let jar = jar.add(session_cookie(session));
    Ok((jar, Redirect::to(&target)).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(token) = session_token(&jar) {
        if let Err(err) = state.auth_service().logout(&token).await {
            tracing::error!(error = ?err, "failed to revoke session");
        }
    }

    let jar = jar.remove(expired_session_cookie());
    (jar, Json(LoggedOutPage { logged_out: true }))
}
