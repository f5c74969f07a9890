use crate::config::PluginConfig;
use crate::models::{PLUGIN_CATEGORY, PLUGIN_NAME, ScanResults};
use crate::services::error::ScanError;
use crate::services::metadata;
use crate::services::parser::{ParsedOutput, parse_output};
use crate::services::runner::{CommandRunner, Deadline, SubprocessPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for bringing avastd up before a scan
const DAEMON_START_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags for archive, boot-sector and full-file scanning
const SCAN_FLAGS: &str = "-abfu";

/// `scan` exits 1 when it finds an infection, so that status still carries
/// a verdict on stdout.
const SCAN_POLICY: SubprocessPolicy = SubprocessPolicy::TolerateExitStatusOne;

/// Trait for virus scanning implementations
#[async_trait::async_trait]
pub trait VirusScanner: Send + Sync {
    /// Scan the file at `target`, giving up once `timeout` has elapsed
    async fn scan(&self, target: &Path, timeout: Duration) -> Result<ScanResults, ScanError>;

    /// Check if the scanner is available/healthy
    async fn health_check(&self) -> bool;
}

/// Avast for Linux driven through its command line tools
pub struct AvastScanner {
    runner: Arc<dyn CommandRunner>,
    scan_bin: String,
    probe_bin: String,
    daemon_init: String,
    update_bin: String,
    updated_file: PathBuf,
    daemon_policy: SubprocessPolicy,
}

impl AvastScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &PluginConfig) -> Self {
        Self {
            runner,
            scan_bin: config.scan_bin.clone(),
            probe_bin: config.probe_bin.clone(),
            daemon_init: config.daemon_init.clone(),
            update_bin: config.update_bin.clone(),
            updated_file: config.updated_file.clone(),
            daemon_policy: config.daemon_policy(),
        }
    }

    /// avastd has to be running before `scan` can talk to it
    async fn start_daemon(&self, timeout: Duration) -> Result<(), ScanError> {
        let deadline = Deadline::after(timeout.min(DAEMON_START_TIMEOUT));
        let output = self
            .runner
            .run(&self.daemon_init, &["start"], Some(deadline))
            .await?;
        self.daemon_policy.check(&self.daemon_init, &output)
    }

    async fn scan_once(&self, target: &Path, deadline: Deadline) -> Result<ParsedOutput, ScanError> {
        let path = target.to_string_lossy().into_owned();
        let output = self
            .runner
            .run(&self.scan_bin, &[SCAN_FLAGS, path.as_str()], Some(deadline))
            .await?;
        SCAN_POLICY.check(&self.scan_bin, &output)?;

        tracing::debug!(
            plugin = PLUGIN_NAME,
            category = PLUGIN_CATEGORY,
            path = %target.display(),
            "Avast Output: {}",
            output.stdout
        );

        parse_output(&output.stdout)
    }

    /// Attach engine, database and update date to a parsed scan
    async fn enrich(&self, parsed: ParsedOutput) -> Result<ScanResults, ScanError> {
        Ok(ScanResults {
            infected: parsed.infected,
            signature_match: parsed.signature_match,
            engine: metadata::engine_version(self.runner.as_ref(), &self.probe_bin).await?,
            database: metadata::database_version(self.runner.as_ref(), &self.probe_bin).await?,
            updated: metadata::updated_date(&self.updated_file).await?,
            markdown: String::new(),
        })
    }

    /// Pull new virus definitions and stamp the update sentinel with today's
    /// date. Returns whatever the update script printed.
    pub async fn update(&self) -> Result<String, ScanError> {
        // A daemon that is already up makes the init script complain; the
        // update script reports real problems on its own.
        if let Err(e) = self.runner.run(&self.daemon_init, &["start"], None).await {
            tracing::warn!("could not start avast daemon before update: {}", e);
        }

        let output = self.runner.run(&self.update_bin, &[], None).await?;
        if !output.success() {
            tracing::warn!(
                "{} exited with {:?}: {}",
                self.update_bin,
                output.status,
                output.stderr.trim()
            );
        }

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        tokio::fs::write(&self.updated_file, today).await?;

        Ok(output.stdout)
    }
}

#[async_trait::async_trait]
impl VirusScanner for AvastScanner {
    async fn scan(&self, target: &Path, timeout: Duration) -> Result<ScanResults, ScanError> {
        self.start_daemon(timeout).await?;

        // Both attempts share one deadline.
        let deadline = Deadline::after(timeout);
        let parsed = match self.scan_once(target, deadline).await {
            Ok(parsed) => parsed,
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    plugin = PLUGIN_NAME,
                    category = PLUGIN_CATEGORY,
                    path = %target.display(),
                    "scan output unparsable, retrying once: {}",
                    e
                );
                self.scan_once(target, deadline).await?
            }
            Err(e) => return Err(e),
        };

        self.enrich(parsed).await
    }

    async fn health_check(&self) -> bool {
        match self.runner.run(&self.probe_bin, &["-v"], None).await {
            Ok(output) => output.success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::runner::CommandOutput;
    use std::sync::Mutex;

    /// Replies to `scan` with queued outputs and to everything else with a
    /// fixed answer per program.
    struct ScriptedRunner {
        scan_outputs: Mutex<Vec<CommandOutput>>,
        daemon_status: i32,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(scan_outputs: Vec<&str>) -> Self {
            Self::with_outputs(scan_outputs.into_iter().map(ok).collect())
        }

        fn with_outputs(mut scan_outputs: Vec<CommandOutput>) -> Self {
            scan_outputs.reverse();
            Self {
                scan_outputs: Mutex::new(scan_outputs),
                daemon_status: 0,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn scan_calls(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with("scan "))
                .count()
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        exited(0, stdout)
    }

    fn exited(status: i32, stdout: &str) -> CommandOutput {
        CommandOutput {
            status: Some(status),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[async_trait::async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[&str],
            _deadline: Option<Deadline>,
        ) -> Result<CommandOutput, ScanError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", program, args.join(" ")));
            match (program, args.first().copied()) {
                ("scan", _) => Ok(self
                    .scan_outputs
                    .lock()
                    .unwrap()
                    .pop()
                    .unwrap_or_else(|| ok(""))),
                ("/bin/scan", Some("-v")) => Ok(ok("4.6.5\n")),
                ("/bin/scan", Some("-V")) => Ok(ok(" 17072405\n")),
                ("/etc/init.d/avast", Some("start")) => Ok(exited(self.daemon_status, "")),
                (_, _) => Ok(ok("")),
            }
        }
    }

    fn scanner(runner: Arc<ScriptedRunner>, updated_file: PathBuf) -> AvastScanner {
        let config = PluginConfig {
            updated_file,
            ..PluginConfig::default()
        };
        AvastScanner::new(runner, &config)
    }

    #[tokio::test]
    async fn test_clean_scan_is_enriched() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec!["/malware/file [OK]\n"]));
        let scanner = scanner(runner.clone(), dir.path().join("UPDATED"));

        let results = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!results.infected);
        assert_eq!(results.signature_match, "");
        assert_eq!(results.engine, "4.6.5");
        assert_eq!(results.database, "17072405");
        assert_eq!(results.updated, metadata::BUILD_TIME);
        assert_eq!(runner.scan_calls(), 1);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0], "/etc/init.d/avast start");
        assert_eq!(calls[1], "scan -abfu /malware/file");
    }

    #[tokio::test]
    async fn test_parse_failure_is_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![
            "garbage without separators",
            "/malware/file\tEICAR Test-NOT virus!!!\n",
        ]));
        let scanner = scanner(runner.clone(), dir.path().join("UPDATED"));

        let results = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(results.infected);
        assert_eq!(results.signature_match, "EICAR Test-NOT virus!!!");
        assert_eq!(runner.scan_calls(), 2);
    }

    #[tokio::test]
    async fn test_second_parse_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec!["nope", "still nope"]));
        let scanner = scanner(runner.clone(), dir.path().join("UPDATED"));

        let err = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::MalformedOutput(_)));
        assert_eq!(runner.scan_calls(), 2);
    }

    #[tokio::test]
    async fn test_detection_exit_status_yields_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::with_outputs(vec![exited(
            1,
            "/malware/file\tEICAR Test-NOT virus!!!\t[FOUND]\n",
        )]));
        let scanner = scanner(runner.clone(), dir.path().join("UPDATED"));

        let results = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(results.infected);
        assert_eq!(results.signature_match, "EICAR Test-NOT virus!!!");
        assert_eq!(runner.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_scan_exit_status_two_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::with_outputs(vec![exited(2, "")]));
        let scanner = scanner(runner.clone(), dir.path().join("UPDATED"));

        let err = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::SubprocessFailure { .. }));
        assert_eq!(runner.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_daemon_exit_status_one_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner {
            daemon_status: 1,
            ..ScriptedRunner::new(vec!["/malware/file [OK]\n"])
        });

        let strict = scanner(runner.clone(), dir.path().join("UPDATED"));
        let err = strict
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::SubprocessFailure { .. }));
        assert_eq!(runner.scan_calls(), 0);

        let config = PluginConfig {
            updated_file: dir.path().join("UPDATED"),
            tolerate_exit_status_one: true,
            ..PluginConfig::default()
        };
        let tolerant = AvastScanner::new(runner.clone(), &config);
        let results = tolerant
            .scan(Path::new("/malware/file"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!results.infected);
    }

    #[tokio::test]
    async fn test_oversized_timeout_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec!["/malware/file [OK]\n"]));
        let scanner = scanner(runner, dir.path().join("UPDATED"));

        let results = scanner
            .scan(Path::new("/malware/file"), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert!(!results.infected);
    }

    #[tokio::test]
    async fn test_update_writes_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("UPDATED");
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let scanner = scanner(runner.clone(), sentinel.clone());

        scanner.update().await.unwrap();

        let written = tokio::fs::read_to_string(&sentinel).await.unwrap();
        assert_eq!(written.len(), 8);
        assert!(written.chars().all(|c| c.is_ascii_digit()));
        assert!(
            runner
                .calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.starts_with("/var/lib/avast/Setup/avast.vpsupdate"))
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let scanner = scanner(runner, PathBuf::from("/nonexistent/UPDATED"));
        assert!(scanner.health_check().await);
    }
}
