pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::PluginConfig;
use crate::services::scanner::VirusScanner;
use axum::{Router, routing::post};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<dyn VirusScanner>,
    pub config: PluginConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/scan", post(api::handlers::scan::scan_upload))
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.max_file_size + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
        ))
        .with_state(state)
}
