mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use yamdb::models::Role;

#[tokio::test]
async fn test_user_management_requires_admin() {
    let app = TestApp::new();
    let (_, user) = app.user("plain", Role::User).await;
    let (_, moderator) = app.user("moder", Role::Moderator).await;

    for token in [None, Some(user.as_str()), Some(moderator.as_str())] {
        let (status, _) = app.get("/api/v1/users", token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.get("/api/v1/users/plain", token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .post("/api/v1/users", token, json!({ "username": "x", "email": "x@example.com" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_admin_creates_lists_and_searches_users() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;

    let (status, body) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({
                "username": "moderator_bob",
                "email": "bob@example.com",
                "first_name": "Bob",
                "role": "moderator"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({
            "username": "moderator_bob",
            "email": "bob@example.com",
            "first_name": "Bob",
            "last_name": "",
            "bio": "",
            "role": "moderator"
        })
    );

    let (status, body) = app.get("/api/v1/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = app.get("/api/v1/users?search=BOB", Some(&admin)).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["username"], "moderator_bob");
}

#[tokio::test]
async fn test_admin_cannot_create_reserved_or_duplicate_username() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;

    let (status, body) = app
        .post("/api/v1/users", Some(&admin), json!({ "username": "me", "email": "me@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["username"].is_array());

    let (status, body) = app
        .post("/api/v1/users", Some(&admin), json!({ "username": "admin", "email": "new@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["username"].is_array());
}

#[tokio::test]
async fn test_admin_gets_patches_and_deletes_user() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;
    app.user("target", Role::User).await;

    let (status, body) = app.get("/api/v1/users/target", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "target@example.com");

    let (status, body) = app
        .patch("/api/v1/users/target", Some(&admin), json!({ "role": "moderator", "bio": "hi" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "moderator");
    assert_eq!(body["bio"], "hi");

    let (status, _) = app.delete("/api/v1/users/target", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get("/api/v1/users/target", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_role_is_bad_request() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;
    app.user("target", Role::User).await;

    let (status, _) = app
        .patch("/api/v1/users/target", Some(&admin), json!({ "role": "superuser" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_self_patch_cannot_change_role() {
    let app = TestApp::new();
    let (_, token) = app.user("alice", Role::User).await;

    let (status, body) = app
        .patch(
            "/api/v1/users/me",
            Some(&token),
            json!({ "first_name": "Alice", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Alice");
    assert_eq!(body["role"], "user");

    let (_, body) = app.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_self_patch_rejects_taken_email() {
    let app = TestApp::new();
    let (_, token) = app.user("alice", Role::User).await;
    app.user("bob", Role::User).await;

    let (status, body) = app
        .patch("/api/v1/users/me", Some(&token), json!({ "email": "bob@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["email"].is_array());
}

#[tokio::test]
async fn test_me_cannot_be_deleted() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;
    let (status, _) = app.delete("/api/v1/users/me", Some(&admin)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_deleting_user_removes_their_reviews() {
    let app = TestApp::new();
    let (_, admin) = app.user("admin", Role::Admin).await;
    let (author, _) = app.user("author", Role::User).await;
    let title = app.title("Film", 2000, &[], None).await;
    app.review(title.id, &author, 8).await;

    app.delete("/api/v1/users/author", Some(&admin)).await;

    assert_eq!(app.repo.review_count(), 0);
    let (_, body) = app.get(&format!("/api/v1/titles/{}", title.id), None).await;
    assert_eq!(body["rating"], serde_json::Value::Null);
}
