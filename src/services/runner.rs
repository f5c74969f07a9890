use crate::services::error::ScanError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Stand-in deadline for budgets too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Absolute point in time a subprocess must finish by
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at, budget }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// How non-zero exit codes from the scanner are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubprocessPolicy {
    /// Any non-zero exit is a failure
    #[default]
    Strict,
    /// Exit status 1 is accepted and its stdout is used as-is
    TolerateExitStatusOne,
}

impl SubprocessPolicy {
    pub fn check(&self, program: &str, output: &CommandOutput) -> Result<(), ScanError> {
        match (self, output.status) {
            (_, Some(0)) => Ok(()),
            (SubprocessPolicy::TolerateExitStatusOne, Some(1)) => {
                tracing::debug!("{} exited with status 1, tolerated by policy", program);
                Ok(())
            }
            (_, status) => Err(ScanError::SubprocessFailure {
                program: program.to_string(),
                status: status
                    .map(|code| format!("exit status {}", code))
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }
}

/// Seam for every external process the plugin spawns
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output. A `None` deadline
    /// lets the process run for as long as it needs.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Option<Deadline>,
    ) -> Result<CommandOutput, ScanError>;
}

/// Runs commands on the host with tokio's process support
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Option<Deadline>,
    ) -> Result<CommandOutput, ScanError> {
        // The child is killed as soon as the wait future is dropped, which is
        // what happens when the deadline fires.
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::SubprocessFailure {
                program: program.to_string(),
                status: "spawn failed".to_string(),
                stderr: e.to_string(),
            })?;

        let output = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at(), child.wait_with_output())
                .await
                .map_err(|_| ScanError::Timeout {
                    program: program.to_string(),
                    seconds: deadline.budget().as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(status: Option<i32>) -> CommandOutput {
        CommandOutput {
            status,
            stdout: String::new(),
            stderr: "boom\n".to_string(),
        }
    }

    #[test]
    fn test_strict_policy_rejects_exit_one() {
        let err = SubprocessPolicy::Strict
            .check("scan", &output(Some(1)))
            .unwrap_err();
        match err {
            ScanError::SubprocessFailure { status, stderr, .. } => {
                assert_eq!(status, "exit status 1");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_tolerant_policy_accepts_exit_one_only() {
        let policy = SubprocessPolicy::TolerateExitStatusOne;
        assert!(policy.check("scan", &output(Some(0))).is_ok());
        assert!(policy.check("scan", &output(Some(1))).is_ok());
        assert!(policy.check("scan", &output(Some(2))).is_err());
        assert!(policy.check("scan", &output(None)).is_err());
    }

    #[test]
    fn test_deadline_saturates_huge_budget() {
        let deadline = Deadline::after(Duration::from_secs(u64::MAX));
        assert_eq!(deadline.budget(), Duration::from_secs(u64::MAX));
        assert!(deadline.at() > Instant::now() + Duration::from_secs(86400 * 365));
    }

    #[test]
    fn test_default_policy_is_strict() {
        assert_eq!(SubprocessPolicy::default(), SubprocessPolicy::Strict);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_stdout() {
        let out = SystemRunner
            .run("sh", &["-c", "printf 'a\\tb'"], Some(Deadline::after(Duration::from_secs(10))))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "a\tb");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_enforces_deadline() {
        let started = std::time::Instant::now();
        let err = SystemRunner
            .run("sh", &["-c", "sleep 5"], Some(Deadline::after(Duration::from_millis(200))))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary() {
        let err = SystemRunner
            .run("/nonexistent/avast/scan", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::SubprocessFailure { .. }));
    }
}
