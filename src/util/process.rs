//! Subprocess execution utilities.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::core::KraftError;
use crate::scheduler::CancelToken;

/// How often a running child is checked against its cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of trailing output lines included in failure messages.
const ERROR_TAIL_LINES: usize = 20;

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Run to completion while watching `cancel`, killing the child if it trips.
    ///
    /// Combined stdout/stderr go to `log_file` when given, otherwise to an
    /// anonymous temp file. On failure the tail of that output is attached to
    /// the error.
    pub fn exec_cancellable(&self, cancel: &CancelToken, log_file: Option<&Path>) -> Result<()> {
        cancel.check()?;

        let mut sink = match log_file {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    crate::util::fs::ensure_dir(parent)?;
                }
                File::options()
                    .create(true)
                    .append(true)
                    .read(true)
                    .open(path)
                    .with_context(|| format!("failed to open log file: {}", path.display()))?
            }
            None => tempfile::tempfile().context("failed to create output buffer")?,
        };
        let start_offset = sink.seek(SeekFrom::End(0))?;

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null())
            .stdout(sink.try_clone()?)
            .stderr(sink.try_clone()?);

        tracing::debug!("running `{}`", self.display_command());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                tracing::debug!("cancelling `{}`", self.display_command());
                let _ = child.kill();
                let _ = child.wait();
                return Err(KraftError::Cancelled.into());
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let tail = read_tail(&mut sink, start_offset).unwrap_or_default();
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                status.code(),
                tail
            );
        }
        Ok(())
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

fn read_tail(file: &mut File, offset: u64) -> std::io::Result<String> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    let lines: Vec<&str> = buf.lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    Ok(lines[start..].join("\n"))
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("make")
            .arg("-C")
            .arg("/src/unikraft")
            .args(["A=/app", "-j4"]);
        assert_eq!(pb.display_command(), "make -C /src/unikraft A=/app -j4");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_cancellable_success_and_log() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("logs/build.log");
        let token = CancelToken::new();

        ProcessBuilder::new("sh")
            .args(["-c", "echo configured"])
            .exec_cancellable(&token, Some(&log))
            .unwrap();

        assert!(std::fs::read_to_string(&log).unwrap().contains("configured"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_cancellable_failure_includes_output() {
        let token = CancelToken::new();
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .exec_cancellable(&token, None)
            .unwrap_err();

        let msg = format!("{:#}", err);
        assert!(msg.contains("exit code Some(3)"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_exec_cancellable_precancelled() {
        let token = CancelToken::new();
        token.cancel();
        let err = ProcessBuilder::new("make")
            .exec_cancellable(&token, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KraftError>(),
            Some(KraftError::Cancelled)
        ));
    }
}
