//! CommandTarget - a target whose work runs in a child OS process.
//!
//! In-process targets can only be stopped where they `.await`. A routine that
//! blocks (waiting on a camera tool, a blocking device write) belongs in a
//! child process instead: each invocation spawns the program with
//! `kill_on_drop`, so `Task::stop_immediately` kills it with SIGKILL wherever
//! it is, mid-syscall included.
//!
//! The child's stdout is the result. It comes back over a pipe and lands in
//! the task's `SharedChannel` like any other result.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::TargetError;
use crate::target::Target;

/// Captured output of one successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args..` once per invocation.
///
/// # 使用例
/// ```ignore
/// let shoot = CommandTarget::new("gphoto2").args(["--capture-image-and-download"]);
/// let mut capture = Task::new(shoot, 1);
/// ```
///
/// A non-zero exit status is a `TargetError` carrying stderr. Only the spawned
/// program is killed on stop; processes it forks itself are not tracked.
#[derive(Debug, Clone)]
pub struct CommandTarget {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl CommandTarget {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    // Command は Clone できないので呼び出しごとに組み立てる
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Target for CommandTarget {
    type Output = CommandOutput;

    async fn invoke(&self) -> Result<CommandOutput, TargetError> {
        let program = self.program.to_string_lossy();
        debug!(%program, "spawning child process");

        let output = self
            .command()
            .output()
            .await
            .map_err(|e| TargetError::Failed(format!("spawn {program}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(TargetError::Failed(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_becomes_the_result() {
        let target = CommandTarget::new("sh").args(["-c", "echo frame; echo warm >&2"]);
        let output = target.invoke().await.unwrap();

        assert_eq!(output.stdout, "frame\n");
        assert_eq!(output.stderr, "warm\n");
    }

    #[tokio::test]
    async fn env_and_current_dir_are_applied() {
        let dir = std::env::temp_dir();
        let target = CommandTarget::new("sh")
            .arg("-c")
            .arg("echo $BOOTH_LED; pwd")
            .env("BOOTH_LED", "printing")
            .current_dir(&dir);

        let output = target.invoke().await.unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("printing"));
        assert_eq!(
            std::fs::canonicalize(lines.next().unwrap()).unwrap(),
            std::fs::canonicalize(&dir).unwrap()
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_target_error() {
        let target = CommandTarget::new("sh").args(["-c", "echo paper jam >&2; exit 3"]);
        let err = target.invoke().await.unwrap_err();

        assert!(err.to_string().contains("paper jam"), "{err}");
    }

    #[tokio::test]
    async fn missing_program_is_a_target_error() {
        let target = CommandTarget::new("shutter-no-such-program");
        let err = target.invoke().await.unwrap_err();

        assert!(err.to_string().starts_with("spawn shutter-no-such-program"), "{err}");
    }
}
