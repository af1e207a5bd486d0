//! Local static check of a generated snippet before it is accepted.

use std::io::Write;

use async_trait::async_trait;
use tracing::warn;

use crate::process::run_tool;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Passed,
    /// Checker output to feed back into the repair prompt.
    Failed(String),
}

#[async_trait]
pub trait CodeChecker: Send + Sync {
    async fn check(&self, code: &str) -> CheckOutcome;
}

/// Writes the snippet to a temporary `.py` file and runs a checker command on
/// it, e.g. `python3 -m py_compile` or `pyright`.
pub struct SubprocessChecker {
    command: Vec<String>,
}

impl SubprocessChecker {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl CodeChecker for SubprocessChecker {
    async fn check(&self, code: &str) -> CheckOutcome {
        let Some((program, args)) = self.command.split_first() else {
            return CheckOutcome::Failed("no checker command configured".to_string());
        };

        let mut file = match tempfile::Builder::new().suffix(".py").tempfile() {
            Ok(f) => f,
            Err(e) => return CheckOutcome::Failed(format!("could not create temp file: {e}")),
        };
        if let Err(e) = file.write_all(code.as_bytes()).and_then(|_| file.flush()) {
            return CheckOutcome::Failed(format!("could not write temp file: {e}"));
        }

        let mut argv: Vec<String> = args.to_vec();
        argv.push(file.path().display().to_string());

        match run_tool(program, &argv, None, None).await {
            Ok(out) if out.success => CheckOutcome::Passed,
            Ok(out) => {
                let report = out.combined();
                if report.is_empty() {
                    CheckOutcome::Failed(format!("checker failed with {}", out.status_text()))
                } else {
                    CheckOutcome::Failed(report)
                }
            }
            Err(e) => {
                warn!("Checker '{}' could not be started: {}", program, e);
                CheckOutcome::Failed(format!("checker '{program}' could not be started: {e}"))
            }
        }
    }
}
