//! Route table and HTTP middleware.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{auth, files, AppState};

/// Headroom for multipart framing on top of the file ceiling. The exact
/// ceiling is enforced by the upload handler.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the CORS layer. Listed origins get credentialed CORS so the
/// session cookie flows; an empty list allows any origin without credentials.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([CONTENT_TYPE, ACCEPT])
            .allow_credentials(true)
            .allow_origin(parsed)
    }
}

pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(state.settings.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/check", get(auth::check))
        .route("/google", post(auth::google))
        .route("/set-password", post(auth::set_password))
        .route("/logout", post(auth::logout));

    let file_routes = Router::new()
        .route("/upload", post(files::upload))
        .route("/files", get(files::list))
        .route(
            "/files/:file_id",
            get(files::get_file)
                .put(files::rename)
                .delete(files::delete),
        )
        .route("/files/:file_id/download", get(files::download))
        .route("/files/:file_id/preview", get(files::preview))
        .route("/share/:file_id", get(files::share))
        .route("/objects/*key", get(files::object));

    Router::new()
        .nest("/auth", auth_routes)
        .merge(file_routes)
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(cors_origins))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
