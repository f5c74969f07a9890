use crate::AppState;
use crate::api::error::AppError;
use crate::models::{AvastReport, PLUGIN_CATEGORY, PLUGIN_NAME};
use crate::services::scanner::VirusScanner;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use futures::TryStreamExt;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Multipart field carrying the sample
pub const UPLOAD_FIELD: &str = "malware";

/// Scans triggered over HTTP always get this budget
pub const WEB_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// `POST /scan`: stage the uploaded sample in a temp file, scan it and
/// answer with the JSON report. The temp file is removed when it drops,
/// whatever the outcome.
pub async fn scan_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AvastReport>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::BadRequest(e.to_string()))?;
    let mut staged: Option<NamedTempFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        tracing::debug!(
            plugin = PLUGIN_NAME,
            category = PLUGIN_CATEGORY,
            "Uploaded fileName: {}",
            field.file_name().unwrap_or("unnamed")
        );

        let tmp = tempfile::Builder::new()
            .prefix("web_")
            .tempfile_in(&state.config.upload_dir)
            .map_err(|e| AppError::Internal(format!("failed to create temp file: {}", e)))?;
        let mut file = tokio::fs::File::from_std(
            tmp.as_file()
                .try_clone()
                .map_err(|e| AppError::Internal(e.to_string()))?,
        );

        let body_with_io_error =
            field.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));
        let mut reader = StreamReader::new(body_with_io_error);
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| AppError::BadRequest(format!("failed to read upload: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        staged = Some(tmp);
        break;
    }

    let staged = staged.ok_or_else(|| {
        AppError::BadRequest(format!("no '{}' field in upload", UPLOAD_FIELD))
    })?;

    let results = state.scanner.scan(staged.path(), WEB_SCAN_TIMEOUT).await?;

    Ok(Json(AvastReport::new(results)))
}
