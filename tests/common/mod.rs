//! Shared fixtures for the HTTP API tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use airfetch::auth::{SessionIssuer, SESSION_COOKIE};
use airfetch::config::MAX_UPLOAD_BYTES;
use airfetch::error::{AppError, Result};
use airfetch::google::{GoogleIdentity, IdentityVerifier};
use airfetch::storage::{LocalStore, ObjectBody, ObjectStore, StorageError, StorageGateway};
use airfetch::{create_router, AppState, Database, Settings};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum_extra::extract::cookie::Cookie;
use axum_test::TestServer;
use bytes::Bytes;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";
pub const PUBLIC_URL: &str = "http://files.test";

/// Google verifier that accepts a fixed set of tokens.
#[derive(Default)]
pub struct FakeVerifier {
    identities: HashMap<String, GoogleIdentity>,
}

impl FakeVerifier {
    pub fn with_identity(mut self, token: &str, subject: &str, email: &str) -> Self {
        self.identities.insert(
            token.to_string(),
            GoogleIdentity {
                subject: subject.to_string(),
                email: email.to_string(),
                name: "Google User".to_string(),
                picture: Some("https://example.com/avatar.png".to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity> {
        self.identities
            .get(id_token)
            .cloned()
            .ok_or_else(|| AppError::InvalidToken("Invalid Google token".to_string()))
    }
}

/// Local store whose deletes always fail, as if the bucket were unreachable.
pub struct FailingDeleteStore(pub LocalStore);

#[async_trait]
impl ObjectStore for FailingDeleteStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> std::result::Result<(), StorageError> {
        self.0.put(key, body, content_type).await
    }

    async fn get(&self, key: &str) -> std::result::Result<ObjectBody, StorageError> {
        self.0.get(key).await
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), StorageError> {
        Err(StorageError::Provider {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        self.0.public_url(key)
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    /// Root of the local object store. Dropping it removes the directory.
    pub storage_dir: TempDir,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_limit(MAX_UPLOAD_BYTES)
}

/// Test server with an in-memory database and a temp-dir object store.
pub fn create_test_app_with_limit(max_upload_bytes: u64) -> TestApp {
    build_test_app(max_upload_bytes, |store| store)
}

/// Test server whose object store is `wrap` applied to the temp-dir store.
pub fn create_test_app_with_store<S: ObjectStore + 'static>(
    wrap: impl FnOnce(LocalStore) -> S,
) -> TestApp {
    build_test_app(MAX_UPLOAD_BYTES, wrap)
}

fn build_test_app<S: ObjectStore + 'static>(
    max_upload_bytes: u64,
    wrap: impl FnOnce(LocalStore) -> S,
) -> TestApp {
    let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");
    let store = LocalStore::new(storage_dir.path(), format!("{PUBLIC_URL}/objects"))
        .expect("Failed to create local store");

    let db = Database::open_in_memory().expect("Failed to create test database");
    let sessions = SessionIssuer::new(TEST_SECRET, chrono::Duration::hours(24));
    let settings = Settings {
        public_url: format!("{PUBLIC_URL}/"),
        max_upload_bytes,
        bcrypt_cost: 4,
        secure_cookie: false,
    };

    let verifier = FakeVerifier::default()
        .with_identity("google-new", "sub-new", "new@gmail.com")
        .with_identity("google-new-moved", "sub-new", "moved@gmail.com")
        .with_identity("google-alice", "sub-alice", "alice@example.com")
        .with_identity("google-mallory", "sub-mallory", "alice@example.com");

    let state = Arc::new(
        AppState::new(
            db,
            StorageGateway::new(Arc::new(wrap(store))),
            sessions,
            settings,
        )
        .with_google(Arc::new(verifier)),
    );

    let router = create_router(state.clone(), &[]);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        state,
        storage_dir,
    }
}

/// Register a user and return the session cookie.
pub async fn register(server: &TestServer, email: &str, password: &str) -> Cookie<'static> {
    let response = server
        .post("/auth/register")
        .json(&json!({
            "name": "Test User",
            "email": email,
            "password": password
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED, "{}", response.text());
    response.cookie(SESSION_COOKIE)
}

/// Session cookie for `token` without going through login.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::new(SESSION_COOKIE, token)
}

/// Number of regular files under `dir`, recursively.
pub fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() {
                        count_files(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

pub fn message(body: &Value) -> &str {
    body["message"].as_str().unwrap_or_default()
}
