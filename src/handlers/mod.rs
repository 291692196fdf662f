//! HTTP handlers and the shared application state.

pub mod auth;
pub mod files;

use std::sync::Arc;

use crate::auth::SessionIssuer;
use crate::db::Database;
use crate::google::IdentityVerifier;
use crate::storage::StorageGateway;

/// Request-independent settings the handlers need.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL for download and share links, without trailing slash.
    pub public_url: String,
    pub max_upload_bytes: u64,
    pub bcrypt_cost: u32,
    pub secure_cookie: bool,
}

/// State shared by every request. Built once at start-up.
pub struct AppState {
    pub db: Database,
    pub storage: StorageGateway,
    pub sessions: SessionIssuer,
    pub google: Option<Arc<dyn IdentityVerifier>>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(
        db: Database,
        storage: StorageGateway,
        sessions: SessionIssuer,
        mut settings: Settings,
    ) -> Self {
        settings.public_url = settings.public_url.trim_end_matches('/').to_string();
        Self {
            db,
            storage,
            sessions,
            google: None,
            settings,
        }
    }

    pub fn with_google(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.google = Some(verifier);
        self
    }

    /// Deterministic download URL for a file id; also used as the share link.
    pub fn download_url(&self, file_id: uuid::Uuid) -> String {
        format!("{}/files/{}/download", self.settings.public_url, file_id)
    }
}
