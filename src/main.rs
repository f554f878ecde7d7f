// src/main.rs
//! packwise: 3D bin packing service
//!
//! A Rust service that packs rectangular items into containers, honoring:
//! - Permitted orientations per item
//! - Weight capacities
//! - Stacking rules (bottom-load, no-stacking, layer/weight/height caps)

mod api;
mod config;
mod constraints;
mod geometry;
mod model;
mod packer;
pub mod types;

use config::AppConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();

    println!("🚀 Packing service starting...");
    api::start_api_server(app_config.api, app_config.engine).await;
}
