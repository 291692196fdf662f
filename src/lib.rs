//! Airfetch - personal cloud file sharing.
//!
//! REST API for uploading files to object storage, listing and renaming them,
//! and handing out download and preview links. Sessions are JWTs carried in
//! an HTTP-only cookie; accounts sign in by password or Google.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod google;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod preview;
pub mod router;
pub mod server;
pub mod storage;
pub mod users;

pub use config::Config;
pub use db::Database;
pub use error::{AppError, Result};
pub use handlers::{AppState, Settings};
pub use router::create_router;
