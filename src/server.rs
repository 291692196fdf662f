//! Application bootstrap: state from configuration, then serve until signalled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::auth::{generate_secret, SessionIssuer};
use crate::config::{Config, StorageBackend, StorageConfig};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::google::GoogleTokenVerifier;
use crate::handlers::{AppState, Settings};
use crate::router::create_router;
use crate::storage::{LocalStore, ObjectStore, S3Credentials, S3Store, StorageError, StorageGateway};

/// Connect timeout for outbound calls (object storage, Google).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total timeout for outbound calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("airfetch/", env!("CARGO_PKG_VERSION"));

fn required(value: &Option<String>, name: &str) -> std::result::Result<String, StorageError> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::Config(format!("{name} is required for the s3 backend")))
}

/// Build the configured object store. Local objects are linked through this
/// server's `/objects` route unless a CDN base is configured.
pub fn build_object_store(
    config: &StorageConfig,
    public_url: &str,
    client: reqwest::Client,
) -> std::result::Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::Local => {
            let public_base = config
                .cdn_base_url
                .clone()
                .unwrap_or_else(|| format!("{}/objects", public_url.trim_end_matches('/')));
            let store = LocalStore::new(&config.local_path, public_base)?;
            tracing::info!(path = %config.local_path, "using local object storage");
            Ok(Arc::new(store))
        }
        StorageBackend::S3 => {
            let endpoint = required(&config.endpoint, "endpoint")?;
            let bucket = required(&config.bucket, "bucket")?;
            let credentials = S3Credentials {
                access_key_id: required(&config.access_key_id, "access_key_id")?,
                secret_access_key: required(&config.secret_access_key, "secret_access_key")?,
            };
            let store = S3Store::new(
                client,
                &endpoint,
                bucket.clone(),
                config.region.clone(),
                credentials,
                config.cdn_base_url.clone(),
            )?;
            tracing::info!(%endpoint, %bucket, "using S3 object storage");
            Ok(Arc::new(store))
        }
    }
}

/// Assemble the shared state from configuration.
pub fn build_state(config: &Config) -> Result<AppState> {
    let db = Database::open(&config.database.path)?;
    tracing::info!(path = %config.database.path, "database opened");

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;

    let store = build_object_store(&config.storage, &config.server.public_url, client.clone())?;

    let secret = match config.auth.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => secret.to_string(),
        None => {
            tracing::warn!("no JWT secret configured; sessions will not survive a restart");
            generate_secret()
        }
    };
    let sessions = SessionIssuer::new(
        &secret,
        chrono::Duration::hours(config.auth.session_ttl_hours),
    );

    let settings = Settings {
        public_url: config.server.public_url.clone(),
        max_upload_bytes: config.storage.max_upload_bytes,
        bcrypt_cost: config.auth.bcrypt_cost,
        secure_cookie: config.auth.secure_cookie,
    };

    let mut state = AppState::new(db, StorageGateway::new(store), sessions, settings);
    match config.auth.google_client_id.as_deref().filter(|s| !s.is_empty()) {
        Some(client_id) => {
            state = state.with_google(Arc::new(GoogleTokenVerifier::new(client, client_id)));
        }
        None => tracing::warn!("GOOGLE_CLIENT_ID not set; Google sign-in disabled"),
    }
    Ok(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Serve the API until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let state = Arc::new(build_state(&config)?);
    let router = create_router(state, &config.cors.origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::Internal(format!("invalid listen address: {e}")))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Internal(format!("failed to bind {addr}: {e}")))?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("server error: {e}")))?;

    tracing::info!("server stopped");
    Ok(())
}
