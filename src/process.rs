//! External command execution.
//!
//! Every collaborator tool (mount, sysctl, iptables, systemctl, fsck, curl,
//! the rootkit scanner) is driven through [`Cmd`], which captures output,
//! folds stderr into failure messages, and reports a missing binary as such.
//! A configured timeout routes execution through the async runtime so the
//! call cannot block past its bound.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;

/// Captured outcome of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if the command was killed by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for one command invocation.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    allow_fail: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
            allow_fail: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Bound the command's runtime. Expiry is always an error, even with
    /// `allow_fail`: a command that never finished produced no result to
    /// tolerate.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Treat a non-zero exit as a result rather than an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Prefix for the failure message instead of the generic "'x' failed".
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Run the command and capture its output.
    pub fn run(self) -> Result<CommandResult> {
        let output = match self.timeout {
            Some(limit) => self.output_bounded(limit)?,
            None => self.output_blocking()?,
        };

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            }
            bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
        }

        Ok(result)
    }

    fn output_blocking(&self) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))
    }

    fn output_bounded(&self, limit: Duration) -> Result<std::process::Output> {
        let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        let outcome = rt.block_on(async {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(&self.args);
            if let Some(ref dir) = self.current_dir {
                cmd.current_dir(dir);
            }
            cmd.kill_on_drop(true);
            tokio::time::timeout(limit, cmd.output()).await
        });

        match outcome {
            Err(_) => bail!(
                "'{} {}' timed out after {}s",
                self.program,
                self.args.join(" "),
                limit.as_secs()
            ),
            Ok(io_result) => io_result.with_context(|| {
                format!("Failed to execute '{}'. Is it installed?", self.program)
            }),
        }
    }
}

/// Run a command with arguments, failing with captured stderr on error.
pub fn run<I, S>(program: &str, args: I) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new(program).args(args).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let result = run("echo", ["hello"]).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout_trimmed(), "hello");
    }

    #[test]
    fn test_failure_includes_stderr() {
        let err = run("ls", ["/nonexistent_path_12345"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No such file") || msg.contains("cannot access"));
    }

    #[test]
    fn test_missing_binary_reported_as_not_installed() {
        let err = Cmd::new("warden_no_such_tool_12345").run().unwrap_err();
        assert!(format!("{:#}", err).contains("Is it installed?"));
    }

    #[test]
    fn test_allow_fail_returns_result() {
        let result = Cmd::new("false").allow_fail().run().unwrap();
        assert!(!result.success());
        assert_eq!(result.code(), 1);
    }

    #[test]
    fn test_custom_error_prefix() {
        let err = Cmd::new("false")
            .error_msg("firewall rule failed")
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("firewall rule failed"));
    }

    #[test]
    fn test_timeout_expiry_is_an_error() {
        let err = Cmd::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run()
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_timeout_unexpired_passes_through() {
        let result = Cmd::new("echo")
            .arg("quick")
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();
        assert_eq!(result.stdout_trimmed(), "quick");
    }

    #[test]
    fn test_dir_sets_working_directory() {
        let result = Cmd::new("pwd").dir(Path::new("/tmp")).run().unwrap();
        assert!(result.stdout_trimmed().ends_with("tmp"));
    }
}
