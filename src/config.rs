//! Configuration loaded from `config.toml`, with secrets overridable from the environment.

use serde::Deserialize;
use std::path::Path;

use crate::error::{AppError, Result};

/// Upload ceiling applied before any storage call.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL used when building download and share links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "airfetch.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Root directory for the `local` backend.
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Public base for object URLs; falls back to `{endpoint}/{bucket}`.
    #[serde(default)]
    pub cdn_base_url: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_local_path() -> String {
    "data/objects".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_max_upload_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: default_local_path(),
            endpoint: None,
            bucket: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            cdn_base_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Adds the `Secure` attribute to the session cookie.
    #[serde(default)]
    pub secure_cookie: bool,
    #[serde(default)]
    pub google_client_id: Option<String>,
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_bcrypt_cost() -> u32 {
    10
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_ttl_hours: default_session_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
            secure_cookie: false,
            google_client_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "https://www.airfetch.online".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Mirror console output into this file when set.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Internal(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::Internal(format!("invalid config: {e}")))
    }

    /// Apply overrides from the process environment (and `.env` if present).
    pub fn apply_env(&mut self) {
        let _ = dotenvy::dotenv();
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("GOOGLE_CLIENT_ID") {
            self.auth.google_client_id = Some(v);
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("R2_ENDPOINT") {
            self.storage.endpoint = Some(v);
            self.storage.backend = StorageBackend::S3;
        }
        if let Some(v) = lookup("R2_BUCKET") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = lookup("R2_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(v);
        }
        if let Some(v) = lookup("R2_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(v);
        }
        if let Some(v) = lookup("CDN_BASE_URL") {
            self.storage.cdn_base_url = Some(v);
        }
    }
}
