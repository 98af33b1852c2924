//! Comment Form Tests

mod common;

use axum::http::StatusCode;
use common::app;
use yatube::domain::comment::CommentFilter;

#[tokio::test]
async fn authorized_user_can_comment() {
    let app = app().await;
    let user = app.create_user("TestUser").await;
    let post = app.create_post(&user, "Тестовый пост достаточной длины", None).await;
    let before = app.comments().count().await.unwrap();

    let resp = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            &[("text", "Тестовый текст комментария")],
            Some(&user),
        )
        .await;

    resp.assert_redirect(&format!("/posts/{}/", post.id));
    assert_eq!(app.comments().count().await.unwrap(), before + 1);

    let comments = app
        .comments()
        .filter(&CommentFilter {
            text: Some("Тестовый текст комментария".to_string()),
            author_id: Some(user.id),
            post_id: Some(post.id),
        })
        .await
        .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author_username, "TestUser");
}

#[tokio::test]
async fn comment_author_is_the_requester_not_the_post_author() {
    let app = app().await;
    let author = app.create_user("author").await;
    let reader = app.create_user("reader").await;
    let post = app.create_post(&author, "Пост", None).await;

    let resp = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            &[("text", "Отличный пост")],
            Some(&reader),
        )
        .await;

    resp.assert_redirect(&format!("/posts/{}/", post.id));
    let comments = app.comments().list_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author_id, reader.id);
}

#[tokio::test]
async fn repeated_comments_always_redirect() {
    let app = app().await;
    let user = app.create_user("regular").await;
    let post = app.create_post(&user, "Пост", None).await;
    let path = format!("/posts/{}/comment/", post.id);

    for n in 0..25 {
        let text = format!("Комментарий {}", n);
        app.post_form(&path, &[("text", text.as_str())], Some(&user))
            .await
            .assert_redirect(&format!("/posts/{}/", post.id));
    }

    let comments = app.comments().list_for_post(post.id).await.unwrap();
    assert_eq!(comments.len(), 25);
    assert_eq!(comments[0].text, "Комментарий 0");
    assert_eq!(comments[24].text, "Комментарий 24");
}

#[tokio::test]
async fn anonymous_comment_is_not_saved() {
    let app = app().await;
    let user = app.create_user("TestUser").await;
    let post = app.create_post(&user, "Тестовый пост достаточной длины", None).await;
    let before = app.comments().count().await.unwrap();

    let resp = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            &[("text", "Новый комментарий к посту")],
            None,
        )
        .await;

    resp.assert_redirect(&format!("/auth/login/?next=/posts/{}/comment/", post.id));
    assert_eq!(app.comments().count().await.unwrap(), before);
}

#[tokio::test]
async fn anonymous_comment_on_missing_post_still_redirects_to_login() {
    let app = app().await;

    let resp = app
        .post_form("/posts/999/comment/", &[("text", "Кто здесь?")], None)
        .await;

    resp.assert_redirect("/auth/login/?next=/posts/999/comment/");
}

#[tokio::test]
async fn comment_on_missing_post_is_not_found() {
    let app = app().await;
    let user = app.create_user("lost").await;

    let resp = app
        .post_form("/posts/999/comment/", &[("text", "Кто здесь?")], Some(&user))
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(app.comments().count().await.unwrap(), 0);
}

#[tokio::test]
async fn blank_comment_rerenders_form() {
    let app = app().await;
    let user = app.create_user("silent").await;
    let post = app.create_post(&user, "Пост", None).await;

    let resp = app
        .post_form(
            &format!("/posts/{}/comment/", post.id),
            &[("text", " \n ")],
            Some(&user),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["post_id"], post.id);
    assert_eq!(body["errors"]["text"][0], "This field is required.");
    assert_eq!(app.comments().count().await.unwrap(), 0);
}

#[tokio::test]
async fn comments_show_on_post_detail_in_order() {
    let app = app().await;
    let user = app.create_user("chatty").await;
    let post = app.create_post(&user, "Пост", None).await;
    let path = format!("/posts/{}/comment/", post.id);

    for text in ["первый", "второй"] {
        app.post_form(&path, &[("text", text)], Some(&user))
            .await
            .assert_redirect(&format!("/posts/{}/", post.id));
    }

    let resp = app.get(&format!("/posts/{}/", post.id), None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["comments"][0]["text"], "первый");
    assert_eq!(body["comments"][1]["text"], "второй");
    assert_eq!(body["author"]["posts_count"], 1);
    assert_eq!(body["form"]["text"], "");
}
