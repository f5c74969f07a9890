use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between spawning the scanner and handing
/// the verdict to a sink.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("{program} exited with {status}: {stderr}")]
    SubprocessFailure {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Malformed scanner output: {0}")]
    MalformedOutput(String),

    #[error("command {program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{context}: {reason}")]
    StorageFailure { context: String, reason: String },

    #[error("{0}")]
    MissingInput(String),

    #[error("could not find {}", .0.display())]
    ConfigurationMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Parse failures are the only errors the scan invoker retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::MalformedOutput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_output_is_retryable() {
        assert!(ScanError::MalformedOutput("x".into()).is_retryable());
        assert!(
            !ScanError::Timeout {
                program: "scan".into(),
                seconds: 1
            }
            .is_retryable()
        );
        assert!(!ScanError::MissingInput("x".into()).is_retryable());
    }

    #[test]
    fn test_configuration_missing_names_path() {
        let err = ScanError::ConfigurationMissing(PathBuf::from("/etc/avast/license.avastlic"));
        assert_eq!(
            err.to_string(),
            "could not find /etc/avast/license.avastlic"
        );
    }
}
