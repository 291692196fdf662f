//! Authentication endpoint tests.

mod common;

use airfetch::auth::{SessionIssuer, SESSION_COOKIE};
use axum::http::{header::SET_COOKIE, StatusCode};
use common::{create_test_app, message, register, session_cookie, TEST_SECRET};
use serde_json::{json, Value};

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let app = create_test_app();

    let response = app
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Ada",
            "email": "Ada@Example.com",
            "password": "correct horse"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let set_cookie = response.header(SET_COOKIE);
    let set_cookie = set_cookie.to_str().unwrap();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));

    let body: Value = response.json();
    assert_eq!(body["user"]["name"], "Ada");
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["isGoogleUser"], false);
    let raw = body.to_string();
    assert!(!raw.contains("password"));
    assert!(!raw.contains("$2b$"));
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = create_test_app();
    register(&app.server, "dup@example.com", "pw-one").await;

    let response = app
        .server
        .post("/auth/register")
        .json(&json!({
            "name": "Other",
            "email": "DUP@example.com",
            "password": "pw-two"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(message(&body), "User already exists");
}

#[tokio::test]
async fn test_register_missing_fields() {
    let app = create_test_app();

    let response = app
        .server
        .post("/auth/register")
        .json(&json!({ "name": "", "email": "x@example.com", "password": "pw" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_and_check() {
    let app = create_test_app();
    register(&app.server, "bob@example.com", "s3cret").await;

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "login": "bob@example.com", "password": "s3cret" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cookie = response.cookie(SESSION_COOKIE);
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], "bob@example.com");

    let response = app.server.get("/auth/check").add_cookie(cookie).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], "bob@example.com");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let app = create_test_app();
    register(&app.server, "carol@example.com", "right").await;

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "email": "carol@example.com", "password": "wrong" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body.get("needsPassword").is_none());
    assert!(response.maybe_cookie(SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_login_unknown_user() {
    let app = create_test_app();

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "login": "nobody@example.com", "password": "whatever" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_check_without_cookie() {
    let app = create_test_app();

    let response = app.server.get("/auth/check").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_check_rejects_forged_token() {
    let app = create_test_app();
    register(&app.server, "dave@example.com", "pw").await;
    let user_id = {
        let response = app
            .server
            .post("/auth/login")
            .json(&json!({ "login": "dave@example.com", "password": "pw" }))
            .await;
        let body: Value = response.json();
        uuid::Uuid::parse_str(body["user"]["_id"].as_str().unwrap()).unwrap()
    };

    let forged = SessionIssuer::new("some-other-secret", chrono::Duration::hours(24))
        .issue(user_id)
        .unwrap();
    let response = app
        .server
        .get("/auth/check")
        .add_cookie(session_cookie(forged))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .get("/auth/check")
        .add_cookie(session_cookie("not.a.jwt".to_string()))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_check_rejects_expired_token() {
    let app = create_test_app();
    let cookie = register(&app.server, "erin@example.com", "pw").await;
    let body: Value = app.server.get("/auth/check").add_cookie(cookie).await.json();
    let user_id = uuid::Uuid::parse_str(body["user"]["_id"].as_str().unwrap()).unwrap();

    let expired = SessionIssuer::new(TEST_SECRET, chrono::Duration::hours(-1))
        .issue(user_id)
        .unwrap();
    let response = app
        .server
        .get("/auth/check")
        .add_cookie(session_cookie(expired))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = create_test_app();

    let response = app.server.post("/auth/logout").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let cookie = response.cookie(SESSION_COOKIE);
    assert_eq!(cookie.value(), "");
}

#[tokio::test]
async fn test_google_sign_in_creates_user() {
    let app = create_test_app();

    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-new" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let cookie = response.cookie(SESSION_COOKIE);
    let body: Value = response.json();
    assert_eq!(body["user"]["email"], "new@gmail.com");
    assert_eq!(body["user"]["isGoogleUser"], true);
    assert_eq!(
        body["user"]["profilePicture"],
        "https://example.com/avatar.png"
    );

    let response = app.server.get("/auth/check").add_cookie(cookie).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // A second sign-in returns the same account.
    let again: Value = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-new" }))
        .await
        .json();
    assert_eq!(again["user"]["_id"], body["user"]["_id"]);
}

#[tokio::test]
async fn test_google_sign_in_invalid_token() {
    let app = create_test_app();

    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "forged" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_google_links_existing_password_account() {
    let app = create_test_app();
    register(&app.server, "alice@example.com", "alice-pw").await;

    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-alice" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["user"]["isGoogleUser"], true);

    // Password login keeps working after linking.
    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "login": "alice@example.com", "password": "alice-pw" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // A different Google subject for the same email is refused.
    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-mallory" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_google_subject_linked_to_other_email() {
    let app = create_test_app();
    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-new" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // Same Google subject, different email: a new account cannot reuse it.
    let response = app
        .server
        .post("/auth/google")
        .json(&json!({ "token": "google-new-moved" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(message(&body), "Google account is already linked to another user");
    assert!(response.maybe_cookie(SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn test_google_only_account_needs_password() {
    let app = create_test_app();
    app.server
        .post("/auth/google")
        .json(&json!({ "token": "google-new" }))
        .await;

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "login": "new@gmail.com", "password": "anything" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["needsPassword"], true);

    let response = app
        .server
        .post("/auth/set-password")
        .json(&json!({ "email": "new@gmail.com", "password": "fresh-pw" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);

    let response = app
        .server
        .post("/auth/login")
        .json(&json!({ "login": "new@gmail.com", "password": "fresh-pw" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    // Setting it a second time is refused.
    let response = app
        .server
        .post("/auth/set-password")
        .json(&json!({ "email": "new@gmail.com", "password": "other" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_password_rules() {
    let app = create_test_app();
    register(&app.server, "plain@example.com", "pw").await;

    let response = app
        .server
        .post("/auth/set-password")
        .json(&json!({ "email": "plain@example.com", "password": "new" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/auth/set-password")
        .json(&json!({ "email": "ghost@example.com", "password": "new" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
