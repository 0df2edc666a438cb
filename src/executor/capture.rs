// src/executor/capture.rs

//! One-shot commands whose output is wanted whole
//!
//! Catalog queries (`spack list`, `spack info`, `spack uninstall`) are short
//! and their output only makes sense complete, so they are not streamed.

use crate::executor::CommandSpec;
use crate::executor::tail::TailBuffer;
use crate::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output of a finished command
#[derive(Debug, Clone)]
pub struct Captured {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Last lines of stderr, or of stdout when stderr is empty
    pub fn diagnostic(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let mut tail = TailBuffer::new(lines, 4 * 1024);
        for line in source.lines() {
            tail.push(line);
        }
        tail.render()
    }

    /// Failure as an error naming the command
    pub fn into_error(self, spec: &CommandSpec) -> Error {
        let stderr = self.diagnostic(10);
        Error::CommandFailed {
            command: spec.display(),
            exit_code: self.exit_code,
            stderr,
        }
    }
}

/// Run `spec` to completion, killing it after `timeout`
pub async fn run_captured(spec: &CommandSpec, timeout: Duration) -> Result<Captured> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %spec.display(), "Running captured command");

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(Error::SpawnError {
                program: spec.program.clone(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            warn!(command = %spec.display(), "Timed out after {:?}", timeout);
            return Err(Error::TimeoutError(timeout.as_secs()));
        }
    };

    Ok(Captured {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
