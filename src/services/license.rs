use crate::models::{PLUGIN_CATEGORY, PLUGIN_NAME};
use crate::services::error::ScanError;
use chrono::{DateTime, Utc};
use std::path::Path;

const VALID_THRU_KEY: &str = "UpdateValidThru";

/// Check whether the Avast license's update entitlement has run out.
///
/// A license without an `UpdateValidThru` entry is reported as not expired.
pub async fn is_license_expired(license: &Path) -> Result<bool, ScanError> {
    let contents = match tokio::fs::read_to_string(license).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::ConfigurationMissing(license.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    is_expired_at(&contents, Utc::now())
}

fn is_expired_at(contents: &str, now: DateTime<Utc>) -> Result<bool, ScanError> {
    let Some(line) = contents
        .lines()
        .filter(|line| !line.is_empty())
        .find(|line| line.contains(VALID_THRU_KEY))
    else {
        tracing::error!("could not find expiration date in license file");
        return Ok(false);
    };

    let value = line
        .trim()
        .trim_start_matches(VALID_THRU_KEY)
        .trim_start_matches('=')
        .trim();
    let epoch: i64 = value.parse().map_err(|e| {
        ScanError::MalformedOutput(format!("invalid {} value {:?}: {}", VALID_THRU_KEY, value, e))
    })?;
    let expires = DateTime::<Utc>::from_timestamp(epoch, 0).ok_or_else(|| {
        ScanError::MalformedOutput(format!("{} out of range: {}", VALID_THRU_KEY, epoch))
    })?;

    let expired = expires < now;
    tracing::debug!(
        plugin = PLUGIN_NAME,
        category = PLUGIN_CATEGORY,
        expired,
        "Avast License Expires: {}",
        expires
    );
    Ok(expired)
}
