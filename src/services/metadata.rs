use crate::services::error::ScanError;
use crate::services::runner::{CommandRunner, SubprocessPolicy};
use std::path::Path;

/// Build timestamp baked in at compile time, used when the update sentinel
/// has never been written.
pub const BUILD_TIME: &str = match option_env!("BUILD_TIME") {
    Some(t) => t,
    None => "",
};

/// Engine version as reported by `scan -v`
pub async fn engine_version(
    runner: &dyn CommandRunner,
    probe_bin: &str,
) -> Result<String, ScanError> {
    let output = runner.run(probe_bin, &["-v"], None).await?;
    SubprocessPolicy::Strict.check(probe_bin, &output)?;
    tracing::debug!("Avast Version: {}", output.stdout);
    Ok(output.stdout.trim().to_string())
}

/// Virus database (VPS) identifier as reported by `scan -V`
pub async fn database_version(
    runner: &dyn CommandRunner,
    probe_bin: &str,
) -> Result<String, ScanError> {
    let output = runner.run(probe_bin, &["-V"], None).await?;
    SubprocessPolicy::Strict.check(probe_bin, &output)?;
    tracing::debug!("Avast Database: {}", output.stdout);
    Ok(output.stdout.trim().to_string())
}

/// Date of the last signature update.
///
/// Returns the sentinel's raw contents, or [`BUILD_TIME`] when the sentinel
/// does not exist.
pub async fn updated_date(sentinel: &Path) -> Result<String, ScanError> {
    match tokio::fs::read_to_string(sentinel).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BUILD_TIME.to_string()),
        Err(e) => Err(e.into()),
    }
}
