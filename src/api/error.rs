use crate::models::{PLUGIN_CATEGORY, PLUGIN_NAME};
use crate::services::error::ScanError;
use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Message returned when the upload is missing or unreadable
pub const MISSING_UPLOAD: &str = "Please supply a valid file to scan.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => {
                tracing::error!(plugin = PLUGIN_NAME, category = PLUGIN_CATEGORY, "{}", msg);
                (StatusCode::BAD_REQUEST, MISSING_UPLOAD.to_string())
            }
            AppError::Scan(ScanError::MissingInput(msg)) => {
                tracing::error!(plugin = PLUGIN_NAME, category = PLUGIN_CATEGORY, "{}", msg);
                (StatusCode::BAD_REQUEST, MISSING_UPLOAD.to_string())
            }
            AppError::Scan(e) => {
                tracing::error!(plugin = PLUGIN_NAME, category = PLUGIN_CATEGORY, "Scan error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Scan failed: {}", e))
            }
            AppError::Internal(msg) => {
                tracing::error!(plugin = PLUGIN_NAME, category = PLUGIN_CATEGORY, "Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", message),
        )
            .into_response()
    }
}
