//! Runs external tools (checker, TTS, Manim, ffmpeg) and captures their output.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stderr and stdout joined, for error reports.
    pub fn combined(&self) -> String {
        let mut out = self.stderr.trim().to_string();
        if !self.stdout.trim().is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(self.stdout.trim());
        }
        out
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run `program` with `args`, optionally feeding `stdin`, and wait for it.
/// Spawn failures (e.g. program not on PATH) come back as `Err`.
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    stdin: Option<&str>,
) -> std::io::Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!("Running {:?}", cmd.as_std());

    let mut child = cmd.spawn()?;
    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input.as_bytes()).await?;
            // Dropping closes stdin so the tool sees EOF.
        }
    }
    let output = child.wait_with_output().await?;

    Ok(ToolOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_streams() {
        let out = ToolOutput {
            success: false,
            code: Some(1),
            stdout: "out\n".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(out.combined(), "err\n\nout");
        assert_eq!(out.status_text(), "exit code 1");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let result = run_tool("eui-no-such-program-xyz", ["--help"], None, None).await;
        assert!(result.is_err());
    }
}
