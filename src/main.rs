use std::path::Path;

use airfetch::{logging, server, Config};
use tracing::info;

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let mut config = if Path::new(&path).exists() {
        match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                std::process::exit(1);
            }
        }
    } else {
        eprintln!("{path} not found, using default configuration.");
        Config::default()
    };
    config.apply_env();

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("Airfetch {}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = server::run(config).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
