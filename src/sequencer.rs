//! Fail-fast execution of shell command sequences.
//!
//! The sequencer knows nothing about git: it runs one line at a time in a working
//! directory and stops at the first nonzero exit. Steps that already ran are left in
//! place; there is no rollback.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// One shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub text: String,
    /// Dropped before execution, never dispatched
    pub skip: bool,
}

impl CommandStep {
    pub fn run(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            skip: false,
        }
    }

    /// A step dropped from the sequence when `skip` is set
    pub fn unless(skip: bool, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            skip,
        }
    }
}

/// Captured result of [`ProcessRunner::exec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell lines on behalf of the sequencer and the git queries
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run and capture stdout (trimmed)
    async fn exec(&self, command_line: &str, cwd: &Path) -> Result<ProcessOutput>;

    /// Run with inherited stdio, returning only the exit code
    async fn shell(&self, command_line: &str, cwd: &Path) -> Result<i32>;
}

/// Runs lines through `sh -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    fn command(command_line: &str, cwd: &Path) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line).current_dir(cwd);
        cmd
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn exec(&self, command_line: &str, cwd: &Path) -> Result<ProcessOutput> {
        debug!(command_line, ?cwd, "Running captured command");

        let output = Self::command(command_line, cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", command_line))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(stderr = %stderr.trim(), "Captured command failed");
        }

        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        })
    }

    async fn shell(&self, command_line: &str, cwd: &Path) -> Result<i32> {
        debug!(command_line, ?cwd, "Running shell command");

        let status = Self::command(command_line, cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Failed to execute '{}'", command_line))?;

        // Killed by a signal: no code, report as failure
        Ok(status.code().unwrap_or(-1))
    }
}

/// Callback told about each step just before it runs
pub type StepObserver = Box<dyn Fn(&str) + Send + Sync>;

/// Why a sequence stopped
#[derive(Debug, Error)]
pub enum SequenceError {
    /// A step exited nonzero, or could not be started (`exit_code` is `None`)
    #[error("step {index} failed ({}): {command}", describe_exit(.exit_code))]
    StepFailed {
        /// Position among the executed (non-skipped) steps
        index: usize,
        command: String,
        exit_code: Option<i32>,
    },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "could not start".to_string(),
    }
}

impl SequenceError {
    pub fn index(&self) -> usize {
        match self {
            SequenceError::StepFailed { index, .. } => *index,
        }
    }
}

/// Summary of a sequence that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub executed: Vec<String>,
    pub skipped: usize,
}

pub struct CommandSequencer {
    runner: Arc<dyn ProcessRunner>,
    observers: Vec<StepObserver>,
}

impl CommandSequencer {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Tell observers about a line that is about to run
    pub fn publish(&self, command_line: &str) {
        for observer in &self.observers {
            observer(command_line);
        }
    }

    /// Run `steps` in order inside `cwd`, stopping at the first failure
    #[instrument(skip_all, fields(cwd = %cwd.display(), steps = steps.len()))]
    pub async fn run(
        &self,
        steps: &[CommandStep],
        cwd: &Path,
    ) -> Result<SequenceReport, SequenceError> {
        let runnable: Vec<&CommandStep> = steps.iter().filter(|s| !s.skip).collect();
        let skipped = steps.len() - runnable.len();
        let mut executed = Vec::with_capacity(runnable.len());

        for (index, step) in runnable.into_iter().enumerate() {
            self.publish(&step.text);

            let exit_code = match self.runner.shell(&step.text, cwd).await {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(index, command = %step.text, error = %e, "Step could not start");
                    None
                }
            };
            executed.push(step.text.clone());

            if exit_code != Some(0) {
                warn!(index, command = %step.text, ?exit_code, "Step failed, aborting sequence");
                return Err(SequenceError::StepFailed {
                    index,
                    command: step.text.clone(),
                    exit_code,
                });
            }
        }

        debug!(executed = executed.len(), skipped, "Sequence complete");
        Ok(SequenceReport { executed, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns scripted exit codes in order and records what was dispatched
    struct ScriptedRunner {
        exit_codes: Mutex<Vec<i32>>,
        dispatched: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(exit_codes: Vec<i32>) -> Self {
            Self {
                exit_codes: Mutex::new(exit_codes),
                dispatched: Mutex::new(Vec::new()),
            }
        }

        fn dispatched(&self) -> Vec<String> {
            self.dispatched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn exec(&self, _command_line: &str, _cwd: &Path) -> Result<ProcessOutput> {
            unreachable!("sequencer only uses shell")
        }

        async fn shell(&self, command_line: &str, _cwd: &Path) -> Result<i32> {
            self.dispatched.lock().unwrap().push(command_line.to_string());
            let mut codes = self.exit_codes.lock().unwrap();
            Ok(if codes.is_empty() { 0 } else { codes.remove(0) })
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let runner = Arc::new(ScriptedRunner::new(vec![0, 1, 0]));
        let sequencer = CommandSequencer::new(runner.clone());
        let steps = vec![
            CommandStep::run("ok-1"),
            CommandStep::run("fail"),
            CommandStep::run("ok-2"),
        ];

        let err = sequencer.run(&steps, Path::new(".")).await.unwrap_err();

        assert_eq!(err.index(), 1);
        assert_eq!(runner.dispatched(), vec!["ok-1", "fail"]);
        match err {
            SequenceError::StepFailed {
                command, exit_code, ..
            } => {
                assert_eq!(command, "fail");
                assert_eq!(exit_code, Some(1));
            }
        }
    }

    #[tokio::test]
    async fn test_skipped_steps_never_dispatched() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let sequencer = CommandSequencer::new(runner.clone());
        let steps = vec![
            CommandStep::run("git checkout dev"),
            CommandStep::unless(true, "git pull origin dev"),
            CommandStep::run("git checkout -b feature/x"),
            CommandStep::unless(true, "git push origin feature/x"),
        ];

        let report = sequencer.run(&steps, Path::new(".")).await.unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(
            runner.dispatched(),
            vec!["git checkout dev", "git checkout -b feature/x"]
        );
        assert_eq!(report.executed, runner.dispatched());
    }

    #[tokio::test]
    async fn test_observers_see_each_step_before_it_runs() {
        let runner = Arc::new(ScriptedRunner::new(vec![0, 2]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sequencer = CommandSequencer::new(runner)
            .with_observer(move |line| seen_clone.lock().unwrap().push(line.to_string()));

        let steps = vec![
            CommandStep::run("a"),
            CommandStep::unless(true, "skipped"),
            CommandStep::run("b"),
            CommandStep::run("c"),
        ];
        let _ = sequencer.run(&steps, Path::new(".")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_empty_sequence_succeeds() {
        let runner = Arc::new(ScriptedRunner::new(vec![]));
        let sequencer = CommandSequencer::new(runner.clone());

        let report = sequencer.run(&[], Path::new(".")).await.unwrap();
        assert!(report.executed.is_empty());
        assert!(runner.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_system_runner_reports_exit_codes() {
        let runner = SystemProcessRunner;
        let cwd = std::env::temp_dir();

        assert_eq!(runner.shell("exit 0", &cwd).await.unwrap(), 0);
        assert_eq!(runner.shell("exit 3", &cwd).await.unwrap(), 3);

        let output = runner.exec("echo '  hello  '", &cwd).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello");
    }
}
