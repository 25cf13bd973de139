//! External tool invocation with timeout

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Captured output of a successful tool run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Builder for one tool invocation.
///
/// The child is killed if the returned future is dropped, so cancelling a
/// caller never leaves a stray process behind.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run to completion. Spawn failure, timeout and non-zero exit are errors
    /// carrying a short message.
    pub async fn execute(&self) -> Result<ToolOutput, String> {
        let name = self.name();
        trace!(tool = %name, args = ?self.args, "running tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", name, e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("{} timed out after {}s", name, self.timeout.as_secs()))?
            .map_err(|e| format!("{} failed: {}", name, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            let detail = stderr.lines().last().unwrap_or("no error output").trim();
            return Err(format!("{} exited with {}: {}", name, output.status, detail));
        }
        Ok(ToolOutput { stdout, stderr })
    }
}
